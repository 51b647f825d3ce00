use super::constants::MIN_K_DIST_SCALE;
use super::constants::MIN_SIGMA;
use super::constants::SMOOTH_K_ITERATIONS;
use super::constants::SMOOTH_K_TOLERANCE;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;
use typed_builder::TypedBuilder;

#[derive(TypedBuilder, Debug)]
pub struct SmoothKnnDist<'a> {
  distances: ArrayView2<'a, f32>,
  k: usize,
  #[builder(default = SMOOTH_K_ITERATIONS)]
  n_iter: usize,
  #[builder(default = 1.0)]
  local_connectivity: f32,
  #[builder(default = 1.0)]
  bandwidth: f32,
  /// Column 0 holds the point itself and is left out of the membership sum.
  #[builder(default = true)]
  skip_self: bool,
}

fn finite_mean(values: impl Iterator<Item = f32>) -> f32 {
  let (sum, count) = values
    .filter(|d| d.is_finite())
    .fold((0.0f64, 0usize), |(s, c), d| (s + d as f64, c + 1));
  if count == 0 {
    0.0
  } else {
    (sum / count as f64) as f32
  }
}

/// Distance to the `local_connectivity`-th nearest non-zero neighbor,
/// interpolating between neighbors for fractional values.
fn local_rho(row: ArrayView1<f32>, local_connectivity: f32) -> f32 {
  let mut non_zero_count = 0usize;
  let mut max_non_zero = 0.0f32;
  for &d in row.iter() {
    if d > 0.0 && d.is_finite() {
      non_zero_count += 1;
      max_non_zero = max_non_zero.max(d);
    }
  }

  if non_zero_count < local_connectivity as usize {
    return if non_zero_count > 0 { max_non_zero } else { 0.0 };
  }

  let index = local_connectivity.floor() as usize;
  let interpolation = local_connectivity - local_connectivity.floor();
  let mut non_zero = row.iter().copied().filter(|&d| d > 0.0 && d.is_finite());
  if index > 0 {
    let nth_minus_1 = non_zero.nth(index - 1).unwrap_or(0.0);
    let mut rho = nth_minus_1;
    if interpolation > SMOOTH_K_TOLERANCE {
      let nth = non_zero.next().unwrap_or(nth_minus_1);
      rho += interpolation * (nth - nth_minus_1);
    }
    rho
  } else {
    interpolation * non_zero.next().unwrap_or(0.0)
  }
}

impl<'a> SmoothKnnDist<'a> {
  /*
    Calibrate a per-point kernel width.

    For each row find rho (distance to the local_connectivity-th nearest
    non-zero neighbor) and sigma such that

      sum_j exp(-max(0, d_j - rho) / sigma) = log2(k) * bandwidth

    over the row's non-self neighbors. Sigma is bisected, then floored at
    MIN_K_DIST_SCALE times the mean neighbor distance (the row mean when
    rho > 0, otherwise the mean over all rows) and at MIN_SIGMA.

    Returns (sigmas, rhos).
  */
  pub fn exec(self) -> (Array1<f32>, Array1<f32>) {
    let SmoothKnnDist {
      distances,
      k,
      n_iter,
      local_connectivity,
      bandwidth,
      skip_self,
    } = self;

    let n_samples = distances.nrows();
    let first = if skip_self { 1 } else { 0 };
    let target = (k as f32).log2() * bandwidth;
    let mean_distances = finite_mean(distances.iter().copied());

    let results: Vec<(f32, f32)> = (0..n_samples)
      .into_par_iter()
      .map(|i| {
        let row = distances.row(i);
        let rho = local_rho(row, local_connectivity);

        let mut lo = 0.0f32;
        let mut hi = f32::INFINITY;
        let mut mid = 1.0f32;
        for _ in 0..n_iter {
          let mut psum = 0.0f32;
          for &dist in row.iter().skip(first) {
            let d = dist - rho;
            psum += if d > 0.0 { (-(d / mid)).exp() } else { 1.0 };
          }

          if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
          }

          if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
          } else {
            lo = mid;
            if hi == f32::INFINITY {
              mid *= 2.0;
            } else {
              mid = (lo + hi) / 2.0;
            }
          }
        }

        let mut sigma = mid;
        let scale = if rho > 0.0 {
          finite_mean(row.iter().copied())
        } else {
          mean_distances
        };
        if sigma < MIN_K_DIST_SCALE * scale {
          sigma = MIN_K_DIST_SCALE * scale;
        }
        (sigma.max(MIN_SIGMA), rho)
      })
      .collect();

    let mut sigmas = Array1::<f32>::zeros(n_samples);
    let mut rhos = Array1::<f32>::zeros(n_samples);
    for (i, (sigma, rho)) in results.into_iter().enumerate() {
      sigmas[i] = sigma;
      rhos[i] = rho;
    }
    (sigmas, rhos)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;
  use ndarray::Array2;

  #[test]
  fn test_rho_is_first_nonzero_distance() {
    let distances = array![[0.0f32, 0.5, 1.0, 2.0], [0.0, 0.0, 3.0, 4.0]];
    let (_, rhos) = SmoothKnnDist::builder()
      .distances(distances.view())
      .k(4)
      .build()
      .exec();
    assert_eq!(rhos[0], 0.5);
    assert_eq!(rhos[1], 3.0);
  }

  #[test]
  fn test_fractional_local_connectivity_interpolates() {
    let distances = array![[0.0f32, 1.0, 2.0, 4.0]];
    let (_, rhos) = SmoothKnnDist::builder()
      .distances(distances.view())
      .k(4)
      .local_connectivity(1.5)
      .build()
      .exec();
    assert!((rhos[0] - 1.5).abs() < 1e-6);
  }

  #[test]
  fn test_all_zero_distances_get_positive_sigma() {
    let distances = Array2::<f32>::zeros((3, 5));
    let (sigmas, rhos) = SmoothKnnDist::builder()
      .distances(distances.view())
      .k(5)
      .build()
      .exec();
    assert!(sigmas.iter().all(|&s| s > 0.0 && s.is_finite()));
    assert!(rhos.iter().all(|&r| r == 0.0));
  }
}
