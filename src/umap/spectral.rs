use super::fuzzy_simplicial_set::SparseMat;
use crate::utils::linalg::orthonormalize_columns;
use faer::Mat;
use faer::Side;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use typed_builder::TypedBuilder;

/// Components up to this size are solved densely.
const DENSE_LIMIT: usize = 256;
const SUBSPACE_MAX_ITERATIONS: usize = 2000;
const RAYLEIGH_RITZ_INTERVAL: usize = 5;
const SUBSPACE_TOLERANCE: f64 = 1e-5;
/// Radius of each component's layout when several are placed on the grid.
const COMPONENT_RADIUS: f64 = 0.4;
const LAYOUT_SCALE: f64 = 10.0;
const NOISE_STD: f64 = 1e-4;

/// Uniform random coordinates in [-10, 10]^dim.
pub fn random_layout(n_samples: usize, dim: usize, rng: &mut StdRng) -> Array2<f32> {
  Array2::from_shape_simple_fn((n_samples, dim), || {
    rng.random_range(-LAYOUT_SCALE as f32..LAYOUT_SCALE as f32)
  })
}

/// Connected components of the graph over its positive-weight edges, by BFS.
/// Vertices are listed in BFS order and components by their smallest vertex.
pub fn connected_components(graph: &SparseMat) -> Vec<Vec<usize>> {
  let n = graph.rows();
  let mut visited = vec![false; n];
  let mut components = Vec::new();

  for start in 0..n {
    if visited[start] {
      continue;
    }
    let mut component = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    visited[start] = true;
    while let Some(node) = queue.pop_front() {
      component.push(node);
      if let Some(row) = graph.outer_view(node) {
        for (neighbor, &w) in row.iter() {
          if w > 0.0 && !visited[neighbor] {
            visited[neighbor] = true;
            queue.push_back(neighbor);
          }
        }
      }
    }
    components.push(component);
  }
  components
}

/// Symmetrically normalised adjacency D^-1/2 A D^-1/2 of one component, in
/// local (component) indices.
struct NormalizedAdjacency {
  indptr: Vec<usize>,
  indices: Vec<usize>,
  values: Vec<f64>,
}

impl NormalizedAdjacency {
  fn of_component(graph: &SparseMat, component: &[usize]) -> Self {
    let mut local = vec![usize::MAX; graph.rows()];
    for (l, &g) in component.iter().enumerate() {
      local[g] = l;
    }

    let degree: Vec<f64> = component
      .iter()
      .map(|&g| {
        graph
          .outer_view(g)
          .map(|row| row.data().iter().map(|&w| w.max(0.0) as f64).sum())
          .unwrap_or(0.0)
      })
      .collect();

    let mut indptr = Vec::with_capacity(component.len() + 1);
    let mut indices = Vec::new();
    let mut values = Vec::new();
    indptr.push(0);
    for (l, &g) in component.iter().enumerate() {
      if let Some(row) = graph.outer_view(g) {
        for (col, &w) in row.iter() {
          let lc = local[col];
          if w > 0.0 && lc != usize::MAX {
            indices.push(lc);
            values.push(w as f64 / (degree[l] * degree[lc]).sqrt());
          }
        }
      }
      indptr.push(indices.len());
    }
    Self {
      indptr,
      indices,
      values,
    }
  }

  fn len(&self) -> usize {
    self.indptr.len() - 1
  }

  fn to_dense(&self) -> Array2<f64> {
    let n = self.len();
    let mut m = Array2::<f64>::zeros((n, n));
    for i in 0..n {
      for p in self.indptr[i]..self.indptr[i + 1] {
        m[(i, self.indices[p])] += self.values[p];
      }
    }
    m
  }

  /// (I + M) / 2 applied to every column of `x`.
  fn apply_shifted(&self, x: &Array2<f64>) -> Array2<f64> {
    let mut out = x * 0.5;
    for i in 0..self.len() {
      for p in self.indptr[i]..self.indptr[i + 1] {
        let w = 0.5 * self.values[p];
        let src = x.row(self.indices[p]);
        out.row_mut(i).scaled_add(w, &src);
      }
    }
    out
  }
}

/// Eigen-decomposition of a dense symmetric matrix with faer. Eigenvalues
/// come back ascending with the matching eigenvectors as columns.
fn self_adjoint_eigen(a: &Array2<f64>) -> Option<(Array1<f64>, Array2<f64>)> {
  let n = a.nrows();
  let m = Mat::from_fn(n, n, |i, j| a[(i, j)]);
  let eig = match m.self_adjoint_eigen(Side::Lower) {
    Ok(eig) => eig,
    Err(err) => {
      warn!(?err, n, "dense eigen-decomposition failed");
      return None;
    }
  };
  let values = Array1::from_iter(eig.S().column_vector().iter().copied());
  let u = eig.U();
  let vectors = Array2::from_shape_fn((n, n), |(i, j)| u[(i, j)]);
  Some((values, vectors))
}

/// The `k` largest eigenpairs of the normalized adjacency, solved densely.
fn dense_eigenvectors(
  adjacency: &NormalizedAdjacency,
  k: usize,
) -> Option<(Array1<f64>, Array2<f64>)> {
  let m = adjacency.to_dense();
  let sym = (&m + &m.t()) * 0.5;
  let (values, vectors) = self_adjoint_eigen(&sym)?;
  let n = values.len();
  // Ascending order, so the largest k are the trailing columns reversed.
  let top_values = values.slice(s![n - k..;-1]).to_owned();
  let top_vectors = vectors.slice(s![.., n - k..;-1]).to_owned();
  Some((top_values, top_vectors))
}

/*
  The k largest eigenpairs of the normalized adjacency M by orthogonal
  subspace iteration on B = (I + M) / 2, whose spectrum lies in [0, 1] with
  the same eigenvectors. A block wider than k speeds convergence of the
  wanted pairs. Every few iterations a Rayleigh-Ritz step rotates the block
  onto Ritz vectors and the residuals |B x - theta x| of the first k are
  checked. Returns None when the block collapses or the residual test never
  passes.
*/
fn subspace_eigenvectors(
  adjacency: &NormalizedAdjacency,
  k: usize,
  rng: &mut StdRng,
) -> Option<(Array1<f64>, Array2<f64>)> {
  let n = adjacency.len();
  let block = (2 * k + 8).min(n);
  let mut x = Array2::from_shape_simple_fn((n, block), || rng.sample::<f64, _>(StandardNormal));
  if !orthonormalize_columns(&mut x) {
    return None;
  }

  for iteration in 1..=SUBSPACE_MAX_ITERATIONS {
    let bx = adjacency.apply_shifted(&x);
    if iteration % RAYLEIGH_RITZ_INTERVAL == 0 {
      let h = x.t().dot(&bx);
      let h = (&h + &h.t()) * 0.5;
      let (thetas, rotation) = self_adjoint_eigen(&h)?;
      let thetas = thetas.slice(s![..;-1]).to_owned();
      let rotation = rotation.slice(s![.., ..;-1]).to_owned();
      let ritz = x.dot(&rotation);
      let b_ritz = bx.dot(&rotation);

      let worst_residual = (0..k)
        .map(|c| {
          let r = &b_ritz.column(c) - &(&ritz.column(c) * thetas[c]);
          r.dot(&r).sqrt()
        })
        .fold(0.0f64, f64::max);
      if worst_residual < SUBSPACE_TOLERANCE {
        debug!(iteration, worst_residual, "subspace iteration converged");
        let values = thetas.slice(s![..k]).mapv(|t| 2.0 * t - 1.0);
        return Some((values, ritz.slice(s![.., ..k]).to_owned()));
      }
      x = b_ritz;
    } else {
      x = bx;
    }
    if !orthonormalize_columns(&mut x) {
      return None;
    }
  }
  None
}

/// Spectral coordinates of one connected component: eigenvectors 2..=dim+1
/// of its normalized adjacency (the smallest non-trivial eigenvectors of the
/// normalized Laplacian).
fn component_layout(
  graph: &SparseMat,
  component: &[usize],
  dim: usize,
  rng: &mut StdRng,
) -> Option<Array2<f64>> {
  let adjacency = NormalizedAdjacency::of_component(graph, component);
  let k = dim + 1;
  let (_, vectors) = if adjacency.len() <= DENSE_LIMIT {
    dense_eigenvectors(&adjacency, k)?
  } else {
    subspace_eigenvectors(&adjacency, k, rng)?
  };
  Some(vectors.slice(s![.., 1..k]).to_owned())
}

/// Center `coords` and scale it so the farthest row is `radius` from the
/// center.
fn fit_to_radius(coords: &mut Array2<f64>, radius: f64) {
  if coords.nrows() == 0 {
    return;
  }
  let n = coords.nrows() as f64;
  for mut column in coords.columns_mut() {
    let mean = column.sum() / n;
    column.mapv_inplace(|v| v - mean);
  }
  let max_norm = coords
    .rows()
    .into_iter()
    .map(|r| r.dot(&r).sqrt())
    .fold(0.0f64, f64::max);
  if max_norm > 0.0 {
    coords.mapv_inplace(|v| v * radius / max_norm);
  }
}

/*
  Spectral initialization of an embedding from its fuzzy graph.

  Each connected component with at least 2 * dim vertices is laid out by
  the leading non-trivial eigenvectors of D^-1/2 A D^-1/2; smaller ones get
  uniform random coordinates. With several components each layout is
  centered, scaled to radius 0.4 and placed on its own cell of a unit
  spaced grid so components never overlap.

  The result is scaled so max |x| = 10 and jittered with N(0, 1e-4) noise.
  If any eigen solve fails the whole layout falls back to uniform random
  coordinates in [-10, 10].
*/
#[derive(TypedBuilder)]
pub struct SpectralLayout<'a> {
  graph: &'a SparseMat,
  dim: usize,
}

impl<'a> SpectralLayout<'a> {
  pub fn exec(self, rng: &mut StdRng) -> Array2<f32> {
    let SpectralLayout { graph, dim } = self;
    let started = Instant::now();
    let n_samples = graph.rows();
    let components = connected_components(graph);
    let n_components = components.len();

    let mut coords = Array2::<f64>::zeros((n_samples, dim));
    let grid_side = grid_side(n_components, dim);

    for (c, component) in components.iter().enumerate() {
      let mut local = if component.len() >= 2 * dim {
        match component_layout(graph, component, dim, rng) {
          Some(local) => local,
          None => {
            warn!(
              component_size = component.len(),
              "spectral initialisation failed to converge, falling back to random initialisation"
            );
            return random_layout(n_samples, dim, rng);
          }
        }
      } else {
        Array2::from_shape_simple_fn((component.len(), dim), || rng.random_range(-1.0..1.0))
      };

      let center = grid_cell(c, grid_side, dim);
      if n_components > 1 {
        fit_to_radius(&mut local, COMPONENT_RADIUS);
      }
      for (l, &g) in component.iter().enumerate() {
        for d in 0..dim {
          coords[(g, d)] = center[d] + local[(l, d)];
        }
      }
    }

    let max_abs = coords.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let expansion = if max_abs > 0.0 {
      LAYOUT_SCALE / max_abs
    } else {
      1.0
    };
    let layout = coords.mapv(|v| {
      let noise = rng.sample::<f64, _>(StandardNormal) * NOISE_STD;
      (v * expansion + noise) as f32
    });
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_components, "spectral_layout complete"
    );
    layout
  }
}

/// Smallest side s with s^dim >= n_components.
fn grid_side(n_components: usize, dim: usize) -> usize {
  let mut side = 1usize;
  while side.checked_pow(dim as u32).is_some_and(|cells| cells < n_components) {
    side += 1;
  }
  side
}

/// Center of grid cell `index`, with unit spacing.
fn grid_cell(index: usize, side: usize, dim: usize) -> Vec<f64> {
  let mut rest = index;
  (0..dim)
    .map(|_| {
      let digit = rest % side;
      rest /= side;
      digit as f64
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use sprs::TriMatI;

  fn graph_from_edges(n: usize, edges: &[(usize, usize, f32)]) -> SparseMat {
    let mut tri = TriMatI::<f32, u32>::new((n, n));
    for &(i, j, w) in edges {
      tri.add_triplet(i, j, w);
      tri.add_triplet(j, i, w);
    }
    tri.to_csr::<u32>()
  }

  fn ring(n: usize, offset: usize) -> Vec<(usize, usize, f32)> {
    (0..n)
      .flat_map(|i| {
        [
          (offset + i, offset + (i + 1) % n, 1.0),
          (offset + i, offset + (i + 2) % n, 0.5),
        ]
      })
      .collect()
  }

  #[test]
  fn test_connected_components() {
    let graph = graph_from_edges(6, &[(0, 1, 1.0), (1, 2, 0.5), (3, 4, 1.0)]);
    let components = connected_components(&graph);
    assert_eq!(components, vec![vec![0, 1, 2], vec![3, 4], vec![5]]);
  }

  #[test]
  fn test_grid_cells_are_distinct() {
    let side = grid_side(5, 2);
    assert_eq!(side, 3);
    let cells: Vec<Vec<f64>> = (0..5).map(|c| grid_cell(c, side, 2)).collect();
    for i in 0..5 {
      for j in (i + 1)..5 {
        assert_ne!(cells[i], cells[j]);
      }
    }
  }

  #[test]
  fn test_layout_is_scaled_and_finite() {
    let graph = graph_from_edges(40, &ring(40, 0));
    let mut rng = StdRng::seed_from_u64(0);
    let layout = SpectralLayout::builder()
      .graph(&graph)
      .dim(2)
      .build()
      .exec(&mut rng);
    assert_eq!(layout.dim(), (40, 2));
    let max_abs = layout.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    assert!((max_abs - 10.0).abs() < 1e-2);
    assert!(layout.iter().all(|v| v.is_finite()));
  }

  #[test]
  fn test_components_do_not_overlap() {
    let mut edges = ring(30, 0);
    edges.extend(ring(30, 30));
    let graph = graph_from_edges(61, &edges);
    let mut rng = StdRng::seed_from_u64(1);
    let layout = SpectralLayout::builder()
      .graph(&graph)
      .dim(2)
      .build()
      .exec(&mut rng);

    let bounds = |range: std::ops::Range<usize>| {
      let xs: Vec<f32> = range.map(|i| layout[(i, 0)]).collect();
      let lo = xs.iter().copied().fold(f32::INFINITY, f32::min);
      let hi = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
      (lo, hi)
    };
    let (_, first_hi) = bounds(0..30);
    let (second_lo, _) = bounds(30..60);
    assert!(first_hi < second_lo, "{first_hi} >= {second_lo}");
  }

  #[test]
  fn test_subspace_matches_dense_eigenvalues() {
    // A sparse random graph has a well separated spectrum.
    let n = 300;
    let mut rng = StdRng::seed_from_u64(5);
    let mut edges = ring(n, 0);
    for i in 0..n {
      for _ in 0..4 {
        let j = rng.random_range(0..n);
        if j != i {
          edges.push((i, j, rng.random_range(0.2f32..1.0)));
        }
      }
    }
    let graph = graph_from_edges(n, &edges);
    let component: Vec<usize> = (0..n).collect();
    let adjacency = NormalizedAdjacency::of_component(&graph, &component);

    let (dense_values, _) = dense_eigenvectors(&adjacency, 3).unwrap();
    let (values, vectors) = subspace_eigenvectors(&adjacency, 3, &mut rng).unwrap();
    for c in 0..3 {
      assert!((values[c] - dense_values[c]).abs() < 1e-4, "{values} vs {dense_values}");
      let norm = vectors.column(c).dot(&vectors.column(c));
      assert!((norm - 1.0).abs() < 1e-8);
    }
    assert!((values[0] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn test_dense_eigenpairs_satisfy_definition() {
    let graph = graph_from_edges(24, &ring(24, 0));
    let component: Vec<usize> = (0..24).collect();
    let adjacency = NormalizedAdjacency::of_component(&graph, &component);
    let m = adjacency.to_dense();

    let (values, vectors) = dense_eigenvectors(&adjacency, 3).unwrap();
    assert!((values[0] - 1.0).abs() < 1e-9);
    assert!(values[0] >= values[1] && values[1] >= values[2]);
    for c in 0..3 {
      let v = vectors.column(c);
      let mv = m.dot(&v);
      for i in 0..24 {
        assert!((mv[i] - values[c] * v[i]).abs() < 1e-9, "pair {c}, row {i}");
      }
    }
  }
}
