use super::BinaryCounts;
use ndarray::Array2;
use ndarray::ArrayView1;

#[inline(always)]
fn pairs<'a>(
  x: &'a ArrayView1<f32>,
  y: &'a ArrayView1<f32>,
) -> impl Iterator<Item = (f32, f32)> + 'a {
  x.iter().zip(y.iter()).map(|(&a, &b)| (a, b))
}

/// Squared Euclidean distance.
#[inline(always)]
pub fn rdist(x: &ArrayView1<f32>, y: &ArrayView1<f32>) -> f32 {
  pairs(x, y)
    .map(|(a, b)| {
      let diff = a - b;
      diff * diff
    })
    .sum()
}

pub fn euclidean(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  rdist(&x, &y).sqrt()
}

pub fn manhattan(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  pairs(&x, &y).map(|(a, b)| (a - b).abs()).sum()
}

pub fn chebyshev(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  pairs(&x, &y).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max)
}

pub fn minkowski(x: ArrayView1<f32>, y: ArrayView1<f32>, p: f32) -> f32 {
  let sum: f32 = pairs(&x, &y).map(|(a, b)| (a - b).abs().powf(p)).sum();
  sum.powf(1.0 / p)
}

pub fn weighted_minkowski(x: ArrayView1<f32>, y: ArrayView1<f32>, w: &[f32], p: f32) -> f32 {
  let sum: f32 = pairs(&x, &y)
    .zip(w)
    .map(|((a, b), &w)| w * (a - b).abs().powf(p))
    .sum();
  sum.powf(1.0 / p)
}

pub fn standardised_euclidean(x: ArrayView1<f32>, y: ArrayView1<f32>, variances: &[f32]) -> f32 {
  let sum: f32 = pairs(&x, &y)
    .zip(variances)
    .map(|((a, b), &v)| {
      let diff = a - b;
      diff * diff / v
    })
    .sum();
  sum.sqrt()
}

pub fn mahalanobis(x: ArrayView1<f32>, y: ArrayView1<f32>, inverse_covariance: &Array2<f32>) -> f32 {
  let diff: Vec<f64> = pairs(&x, &y).map(|(a, b)| (a - b) as f64).collect();
  let mut sum = 0.0f64;
  for (i, row) in inverse_covariance.outer_iter().enumerate() {
    let mut tmp = 0.0f64;
    for (j, &v) in row.iter().enumerate() {
      tmp += v as f64 * diff[j];
    }
    sum += tmp * diff[i];
  }
  sum.max(0.0).sqrt() as f32
}

pub fn canberra(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  pairs(&x, &y)
    .map(|(a, b)| {
      let denom = a.abs() + b.abs();
      if denom > 0.0 {
        (a - b).abs() / denom
      } else {
        0.0
      }
    })
    .sum()
}

pub fn bray_curtis(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  let (num, denom) = pairs(&x, &y).fold((0.0f32, 0.0f32), |(n, d), (a, b)| {
    (n + (a - b).abs(), d + (a + b).abs())
  });
  if denom > 0.0 {
    num / denom
  } else {
    0.0
  }
}

pub fn cosine(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  let mut dot = 0.0f64;
  let mut norm_x = 0.0f64;
  let mut norm_y = 0.0f64;
  for (a, b) in pairs(&x, &y) {
    let (a, b) = (a as f64, b as f64);
    dot += a * b;
    norm_x += a * a;
    norm_y += b * b;
  }
  super::cosine_from_parts(dot, norm_x, norm_y)
}

pub fn correlation(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  let n = x.len() as f64;
  let mu_x = x.iter().map(|&v| v as f64).sum::<f64>() / n;
  let mu_y = y.iter().map(|&v| v as f64).sum::<f64>() / n;
  let mut dot = 0.0f64;
  let mut norm_x = 0.0f64;
  let mut norm_y = 0.0f64;
  for (a, b) in pairs(&x, &y) {
    let a = a as f64 - mu_x;
    let b = b as f64 - mu_y;
    dot += a * b;
    norm_x += a * a;
    norm_y += b * b;
  }
  super::correlation_from_parts(dot, norm_x, norm_y)
}

/// Great-circle distance between two (latitude, longitude) pairs in radians.
pub fn haversine(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  let sin_lat = (0.5 * (x[0] - y[0]) as f64).sin();
  let sin_long = (0.5 * (x[1] - y[1]) as f64).sin();
  let result =
    (sin_lat * sin_lat + (x[0] as f64).cos() * (y[0] as f64).cos() * sin_long * sin_long).sqrt();
  (2.0 * result.min(1.0).asin()) as f32
}

pub fn hamming(x: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
  let differing = pairs(&x, &y).filter(|(a, b)| a != b).count();
  differing as f32 / x.len() as f32
}

/// Count agreement of the nonzero patterns of two dense rows.
pub fn binary_counts(x: ArrayView1<f32>, y: ArrayView1<f32>) -> BinaryCounts {
  let mut counts = BinaryCounts {
    n: x.len(),
    ..Default::default()
  };
  for (a, b) in pairs(&x, &y) {
    counts.add(a != 0.0, b != 0.0);
  }
  counts
}
