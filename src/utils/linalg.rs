use ndarray::Array2;

/// Orthonormalise the columns of `m` in place (modified Gram-Schmidt).
///
/// Returns false if a column collapses to (numerically) zero.
pub fn orthonormalize_columns(m: &mut Array2<f64>) -> bool {
  let cols = m.ncols();
  for j in 0..cols {
    for i in 0..j {
      let proj = m.column(i).dot(&m.column(j));
      let prev = m.column(i).to_owned();
      m.column_mut(j).scaled_add(-proj, &prev);
    }
    let norm = m.column(j).dot(&m.column(j)).sqrt();
    if norm < 1e-12 {
      return false;
    }
    m.column_mut(j).mapv_inplace(|x| x / norm);
  }
  true
}
