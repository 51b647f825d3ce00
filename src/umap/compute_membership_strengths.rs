use dashmap::DashSet;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;
use typed_builder::TypedBuilder;

/// Membership strength of a directed edge at distance `dist` from a point
/// with calibration `(rho, sigma)`, raised to `exponent`.
#[inline]
pub fn membership_strength(dist: f32, rho: f32, sigma: f32, exponent: f32) -> f32 {
  let w = if dist - rho <= 0.0 || sigma == 0.0 {
    1.0
  } else {
    f32::exp(-(dist - rho) / sigma)
  };
  if exponent == 1.0 {
    w
  } else {
    w.powf(exponent)
  }
}

/*
  Membership strengths of every kNN edge as COO triples.

  Rows are the query points, columns are neighbor indices. When not
  bipartite the rows and columns index the same point set and self edges get
  strength 0. Edges listed in `knn_disconnections` (as (row, column) positions
  in the kNN arrays) and sentinel indices >= n_columns are dropped.
*/
#[derive(TypedBuilder)]
pub struct ComputeMembershipStrengths<'i, 'k, 'd, 's, 'r> {
  knn_indices: ArrayView2<'i, u32>,
  knn_dists: ArrayView2<'k, f32>,
  knn_disconnections: &'d DashSet<(usize, usize)>,
  sigmas: ArrayView1<'s, f32>,
  rhos: ArrayView1<'r, f32>,
  n_columns: usize,
  #[builder(default = 1.0)]
  exponent: f32,
  #[builder(default = false)]
  bipartite: bool,
}

impl<'i, 'k, 'd, 's, 'r> ComputeMembershipStrengths<'i, 'k, 'd, 's, 'r> {
  pub fn exec(self) -> (Array1<u32>, Array1<u32>, Array1<f32>) {
    let Self {
      knn_indices,
      knn_dists,
      knn_disconnections,
      sigmas,
      rhos,
      n_columns,
      exponent,
      bipartite,
    } = self;

    let n_samples = knn_indices.nrows();
    let n_neighbors = knn_indices.ncols();

    let results: Vec<Vec<(u32, u32, f32)>> = (0..n_samples)
      .into_par_iter()
      .map(|i| {
        (0..n_neighbors)
          .filter_map(|j| {
            if knn_disconnections.contains(&(i, j)) {
              return None;
            }
            let knn_idx = knn_indices[(i, j)];
            if knn_idx as usize >= n_columns {
              return None;
            }
            let val = if !bipartite && knn_idx == i as u32 {
              0.0
            } else {
              membership_strength(knn_dists[(i, j)], rhos[i], sigmas[i], exponent)
            };
            Some((i as u32, knn_idx, val))
          })
          .collect()
      })
      .collect();

    let total: usize = results.iter().map(Vec::len).sum();
    let mut rows = Vec::with_capacity(total);
    let mut cols = Vec::with_capacity(total);
    let mut vals = Vec::with_capacity(total);
    for (r, c, v) in results.into_iter().flatten() {
      rows.push(r);
      cols.push(c);
      vals.push(v);
    }
    (Array1::from(rows), Array1::from(cols), Array1::from(vals))
  }
}
