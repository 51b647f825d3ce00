//! Shared test data: the iris measurements, seeded uniform and Gaussian
//! data (dense and sparse) and a few reference computations.

use crate::data::Dataset;
use crate::metric::Metric;
use ndarray::Array2;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use sprs::CsMat;
use sprs::TriMat;

#[rustfmt::skip]
const IRIS: [[f32; 4]; 150] = [
  [5.1, 3.5, 1.4, 0.2], [4.9, 3.0, 1.4, 0.2], [4.7, 3.2, 1.3, 0.2], [4.6, 3.1, 1.5, 0.2],
  [5.0, 3.6, 1.4, 0.2], [5.4, 3.9, 1.7, 0.4], [4.6, 3.4, 1.4, 0.3], [5.0, 3.4, 1.5, 0.2],
  [4.4, 2.9, 1.4, 0.2], [4.9, 3.1, 1.5, 0.1], [5.4, 3.7, 1.5, 0.2], [4.8, 3.4, 1.6, 0.2],
  [4.8, 3.0, 1.4, 0.1], [4.3, 3.0, 1.1, 0.1], [5.8, 4.0, 1.2, 0.2], [5.7, 4.4, 1.5, 0.4],
  [5.4, 3.9, 1.3, 0.4], [5.1, 3.5, 1.4, 0.3], [5.7, 3.8, 1.7, 0.3], [5.1, 3.8, 1.5, 0.3],
  [5.4, 3.4, 1.7, 0.2], [5.1, 3.7, 1.5, 0.4], [4.6, 3.6, 1.0, 0.2], [5.1, 3.3, 1.7, 0.5],
  [4.8, 3.4, 1.9, 0.2], [5.0, 3.0, 1.6, 0.2], [5.0, 3.4, 1.6, 0.4], [5.2, 3.5, 1.5, 0.2],
  [5.2, 3.4, 1.4, 0.2], [4.7, 3.2, 1.6, 0.2], [4.8, 3.1, 1.6, 0.2], [5.4, 3.4, 1.5, 0.4],
  [5.2, 4.1, 1.5, 0.1], [5.5, 4.2, 1.4, 0.2], [4.9, 3.1, 1.5, 0.2], [5.0, 3.2, 1.2, 0.2],
  [5.5, 3.5, 1.3, 0.2], [4.9, 3.6, 1.4, 0.1], [4.4, 3.0, 1.3, 0.2], [5.1, 3.4, 1.5, 0.2],
  [5.0, 3.5, 1.3, 0.3], [4.5, 2.3, 1.3, 0.3], [4.4, 3.2, 1.3, 0.2], [5.0, 3.5, 1.6, 0.6],
  [5.1, 3.8, 1.9, 0.4], [4.8, 3.0, 1.4, 0.3], [5.1, 3.8, 1.6, 0.2], [4.6, 3.2, 1.4, 0.2],
  [5.3, 3.7, 1.5, 0.2], [5.0, 3.3, 1.4, 0.2],
  [7.0, 3.2, 4.7, 1.4], [6.4, 3.2, 4.5, 1.5], [6.9, 3.1, 4.9, 1.5], [5.5, 2.3, 4.0, 1.3],
  [6.5, 2.8, 4.6, 1.5], [5.7, 2.8, 4.5, 1.3], [6.3, 3.3, 4.7, 1.6], [4.9, 2.4, 3.3, 1.0],
  [6.6, 2.9, 4.6, 1.3], [5.2, 2.7, 3.9, 1.4], [5.0, 2.0, 3.5, 1.0], [5.9, 3.0, 4.2, 1.5],
  [6.0, 2.2, 4.0, 1.0], [6.1, 2.9, 4.7, 1.4], [5.6, 2.9, 3.6, 1.3], [6.7, 3.1, 4.4, 1.4],
  [5.6, 3.0, 4.5, 1.5], [5.8, 2.7, 4.1, 1.0], [6.2, 2.2, 4.5, 1.5], [5.6, 2.5, 3.9, 1.1],
  [5.9, 3.2, 4.8, 1.8], [6.1, 2.8, 4.0, 1.3], [6.3, 2.5, 4.9, 1.5], [6.1, 2.8, 4.7, 1.2],
  [6.4, 2.9, 4.3, 1.3], [6.6, 3.0, 4.4, 1.4], [6.8, 2.8, 4.8, 1.4], [6.7, 3.0, 5.0, 1.7],
  [6.0, 2.9, 4.5, 1.5], [5.7, 2.6, 3.5, 1.0], [5.5, 2.4, 3.8, 1.1], [5.5, 2.4, 3.7, 1.0],
  [5.8, 2.7, 3.9, 1.2], [6.0, 2.7, 5.1, 1.6], [5.4, 3.0, 4.5, 1.5], [6.0, 3.4, 4.5, 1.6],
  [6.7, 3.1, 4.7, 1.5], [6.3, 2.3, 4.4, 1.3], [5.6, 3.0, 4.1, 1.3], [5.5, 2.5, 4.0, 1.3],
  [5.5, 2.6, 4.4, 1.2], [6.1, 3.0, 4.6, 1.4], [5.8, 2.6, 4.0, 1.2], [5.0, 2.3, 3.3, 1.0],
  [5.6, 2.7, 4.2, 1.3], [5.7, 3.0, 4.2, 1.2], [5.7, 2.9, 4.2, 1.3], [6.2, 2.9, 4.3, 1.3],
  [5.1, 2.5, 3.0, 1.1], [5.7, 2.8, 4.1, 1.3],
  [6.3, 3.3, 6.0, 2.5], [5.8, 2.7, 5.1, 1.9], [7.1, 3.0, 5.9, 2.1], [6.3, 2.9, 5.6, 1.8],
  [6.5, 3.0, 5.8, 2.2], [7.6, 3.0, 6.6, 2.1], [4.9, 2.5, 4.5, 1.7], [7.3, 2.9, 6.3, 1.8],
  [6.7, 2.5, 5.8, 1.8], [7.2, 3.6, 6.1, 2.5], [6.5, 3.2, 5.1, 2.0], [6.4, 2.7, 5.3, 1.9],
  [6.8, 3.0, 5.5, 2.1], [5.7, 2.5, 5.0, 2.0], [5.8, 2.8, 5.1, 2.4], [6.4, 3.2, 5.3, 2.3],
  [6.5, 3.0, 5.5, 1.8], [7.7, 3.8, 6.7, 2.2], [7.7, 2.6, 6.9, 2.3], [6.0, 2.2, 5.0, 1.5],
  [6.9, 3.2, 5.7, 2.3], [5.6, 2.8, 4.9, 2.0], [7.7, 2.8, 6.7, 2.0], [6.3, 2.7, 4.9, 1.8],
  [6.7, 3.3, 5.7, 2.1], [7.2, 3.2, 6.0, 1.8], [6.2, 2.8, 4.8, 1.8], [6.1, 3.0, 4.9, 1.8],
  [6.4, 2.8, 5.6, 2.1], [7.2, 3.0, 5.8, 1.6], [7.4, 2.8, 6.1, 1.9], [7.9, 3.8, 6.4, 2.0],
  [6.4, 2.8, 5.6, 2.2], [6.3, 2.8, 5.1, 1.5], [6.1, 2.6, 5.6, 1.4], [7.7, 3.0, 6.1, 2.3],
  [6.3, 3.4, 5.6, 2.4], [6.4, 3.1, 5.5, 1.8], [6.0, 3.0, 4.8, 1.8], [6.9, 3.1, 5.4, 2.1],
  [6.7, 3.1, 5.6, 2.4], [6.9, 3.1, 5.1, 2.3], [5.8, 2.7, 5.1, 1.9], [6.8, 3.2, 5.9, 2.3],
  [6.7, 3.3, 5.7, 2.5], [6.7, 3.0, 5.2, 2.3], [6.3, 2.5, 5.0, 1.9], [6.5, 3.0, 5.2, 2.0],
  [6.2, 3.4, 5.4, 2.3], [5.9, 3.0, 5.1, 1.8],
];

/// Fisher's iris measurements (150 x 4), in the usual class order.
pub fn iris() -> Array2<f32> {
  Array2::from_shape_fn((150, 4), |(i, j)| IRIS[i][j])
}

/// Split rows into two sets with a seeded coin of probability `p_first`.
pub fn split_rows(data: &Array2<f32>, p_first: f64, seed: u64) -> (Array2<f32>, Array2<f32>) {
  let mut rng = StdRng::seed_from_u64(seed);
  let (first, second): (Vec<usize>, Vec<usize>) =
    (0..data.nrows()).partition(|_| rng.random_bool(p_first));
  (
    data.select(ndarray::Axis(0), &first),
    data.select(ndarray::Axis(0), &second),
  )
}

/// Uniform [0, 1) data with two all-zero rows appended.
pub fn uniform_with_zeros(n_samples: usize, n_features: usize, seed: u64) -> Array2<f32> {
  let mut rng = StdRng::seed_from_u64(seed);
  Array2::from_shape_fn((n_samples + 2, n_features), |(i, _)| {
    if i < n_samples {
      rng.random_range(0.0..1.0)
    } else {
      0.0
    }
  })
}

/// `uniform_with_zeros` with each entry kept with probability `density`,
/// as a CSR matrix alongside its dense copy.
pub fn sparse_uniform_with_zeros(
  n_samples: usize,
  n_features: usize,
  density: f64,
  seed: u64,
) -> (CsMat<f32>, Array2<f32>) {
  let mut dense = uniform_with_zeros(n_samples, n_features, seed);
  let mut mask = StdRng::seed_from_u64(seed.wrapping_add(1));
  dense.mapv_inplace(|v| if mask.random_bool(density) { v } else { 0.0 });

  (to_csr(&dense), dense)
}

/// CSR copy of a dense matrix, without explicit zeros.
pub fn to_csr(dense: &Array2<f32>) -> CsMat<f32> {
  let mut tri = TriMat::new(dense.dim());
  for ((i, j), &v) in dense.indexed_iter() {
    if v != 0.0 {
      tri.add_triplet(i, j, v);
    }
  }
  tri.to_csr::<usize>()
}

/// Isotropic Gaussian blobs with centers uniform in [-box_size, box_size].
/// Returns the points and their blob labels.
pub fn blobs(
  n_samples: usize,
  n_features: usize,
  n_centers: usize,
  std: f32,
  box_size: f32,
  seed: u64,
) -> (Array2<f32>, Vec<usize>) {
  let mut rng = StdRng::seed_from_u64(seed);
  let centers = Array2::from_shape_simple_fn((n_centers, n_features), || {
    rng.random_range(-box_size..box_size)
  });
  let labels: Vec<usize> = (0..n_samples).map(|i| i * n_centers / n_samples).collect();
  let data = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
    centers[(labels[i], j)] + std * rng.sample::<f32, _>(StandardNormal)
  });
  (data, labels)
}

/// Lloyd's k-means with farthest-point seeding. Returns cluster labels.
pub fn kmeans(points: ArrayView2<f32>, k: usize, iterations: usize) -> Vec<usize> {
  let n = points.nrows();
  let dist = |a: usize, center: &[f32]| -> f32 {
    points
      .row(a)
      .iter()
      .zip(center)
      .map(|(x, c)| (x - c) * (x - c))
      .sum()
  };

  let mut centers: Vec<Vec<f32>> = vec![points.row(0).to_vec()];
  while centers.len() < k {
    let farthest = (0..n)
      .max_by(|&a, &b| {
        let da = centers.iter().map(|c| dist(a, c)).fold(f32::INFINITY, f32::min);
        let db = centers.iter().map(|c| dist(b, c)).fold(f32::INFINITY, f32::min);
        da.total_cmp(&db)
      })
      .unwrap();
    centers.push(points.row(farthest).to_vec());
  }

  let mut labels = vec![0usize; n];
  for _ in 0..iterations {
    for (i, label) in labels.iter_mut().enumerate() {
      *label = (0..k)
        .min_by(|&a, &b| dist(i, &centers[a]).total_cmp(&dist(i, &centers[b])))
        .unwrap();
    }
    for (c, center) in centers.iter_mut().enumerate() {
      let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
      if members.is_empty() {
        continue;
      }
      for (d, value) in center.iter_mut().enumerate() {
        *value = members.iter().map(|&i| points[(i, d)]).sum::<f32>() / members.len() as f32;
      }
    }
  }
  labels
}

/// Exact k nearest neighbor distances of every point, ascending, including
/// the point itself.
pub fn brute_force_knn_distances(data: &Dataset, metric: &dyn Metric, k: usize) -> Array2<f32> {
  let n = data.n_samples();
  let mut out = Array2::<f32>::zeros((n, k));
  for i in 0..n {
    let mut dists: Vec<f32> = (0..n).map(|j| data.distance(metric, i, j)).collect();
    dists.sort_by(f32::total_cmp);
    for (c, &d) in dists.iter().take(k).enumerate() {
      out[(i, c)] = d;
    }
  }
  out
}
