//! Embedding quality measures.

use crate::error::Result;
use crate::error::UmapError;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;

fn squared_euclidean(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
  a.iter()
    .zip(b.iter())
    .map(|(&x, &y)| {
      let d = x as f64 - y as f64;
      d * d
    })
    .sum()
}

/// Indices of all other points ordered by euclidean distance to `i`, ties
/// broken by index.
fn ranked_neighbors(points: ArrayView2<f32>, i: usize) -> Vec<usize> {
  let mut others: Vec<(f64, usize)> = (0..points.nrows())
    .filter(|&j| j != i)
    .map(|j| (squared_euclidean(points.row(i), points.row(j)), j))
    .collect();
  others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
  others.into_iter().map(|(_, j)| j).collect()
}

/*
  Trustworthiness of an embedding: how far the k nearest neighbors in the
  embedding are from being k nearest neighbors in the original space.

    T(k) = 1 - 2 / (n k (2n - 3k - 1)) * sum_i sum_{j in U_i} (r(i, j) - k)

  where U_i are the embedding neighbors of i that are not among its k
  original neighbors and r(i, j) is the rank of j by original distance.
  1 means every local neighborhood is preserved. Both spaces use euclidean
  distance. Requires k < n / 2.
*/
pub fn trustworthiness(original: ArrayView2<f32>, embedding: ArrayView2<f32>, k: usize) -> Result<f64> {
  let n = original.nrows();
  if embedding.nrows() != n {
    return Err(UmapError::ShapeMismatch(format!(
      "original has {n} rows but embedding has {}",
      embedding.nrows()
    )));
  }
  if k == 0 || 2 * k >= n {
    return Err(UmapError::InvalidParameter(format!(
      "k must be in [1, n / 2), got {k} for {n} samples"
    )));
  }

  let penalty: f64 = (0..n)
    .into_par_iter()
    .map(|i| {
      let original_order = ranked_neighbors(original, i);
      let mut rank = vec![0usize; n];
      for (position, &j) in original_order.iter().enumerate() {
        rank[j] = position + 1;
      }
      ranked_neighbors(embedding, i)
        .into_iter()
        .take(k)
        .filter(|&j| rank[j] > k)
        .map(|j| (rank[j] - k) as f64)
        .sum::<f64>()
    })
    .sum();

  let (n, k) = (n as f64, k as f64);
  Ok(1.0 - 2.0 / (n * k * (2.0 * n - 3.0 * k - 1.0)) * penalty)
}
