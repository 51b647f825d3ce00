use super::fuzzy_simplicial_set::SparseMat;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Axis;

/*
  Initial positions of new points from the bipartite graph of their
  memberships to the fitted points.

  A new point with an exact match among the fitted points (`exact_matches`,
  one entry per row) starts exactly on it. Otherwise it starts at the
  membership-weighted mean of its neighbors' coordinates. A point with no
  membership mass starts at the centroid of the fitted embedding so the
  output stays finite.
*/
pub fn init_graph_transform(
  graph: &SparseMat,
  exact_matches: &[Option<usize>],
  embedding: ArrayView2<f32>,
) -> Array2<f32> {
  let dim = embedding.ncols();
  let centroid = embedding
    .mean_axis(Axis(0))
    .unwrap_or_else(|| Array1::zeros(dim));
  let mut result = Array2::<f32>::zeros((graph.rows(), dim));

  for (row_index, row) in graph.outer_iterator().enumerate() {
    let mut target = result.row_mut(row_index);
    if let Some(col) = exact_matches.get(row_index).copied().flatten() {
      target.assign(&embedding.row(col));
      continue;
    }

    let row_sum: f32 = row.data().iter().sum();
    if row_sum <= 0.0 {
      target.assign(&centroid);
      continue;
    }
    for (col, &w) in row.iter() {
      target.scaled_add(w / row_sum, &embedding.row(col));
    }
  }

  result
}

/// For each kNN row, the first listed neighbor at distance 0, if any.
/// Sentinel indices at or beyond `n_reference` are skipped.
pub fn exact_matches(
  knn_indices: ArrayView2<u32>,
  knn_dists: ArrayView2<f32>,
  n_reference: usize,
) -> Vec<Option<usize>> {
  knn_indices
    .outer_iter()
    .zip(knn_dists.outer_iter())
    .map(|(indices, dists)| {
      indices
        .iter()
        .zip(dists.iter())
        .find(|&(&j, &d)| d == 0.0 && (j as usize) < n_reference)
        .map(|(&j, _)| j as usize)
    })
    .collect()
}
