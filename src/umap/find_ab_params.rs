const N_POINTS: usize = 300;
const MAX_ITERATIONS: usize = 500;

/// Sum of squared residuals of `1 / (1 + a x^(2b))` against `yv`.
fn sse(xv: &[f64], yv: &[f64], a: f64, b: f64) -> f64 {
  xv.iter()
    .zip(yv)
    .map(|(&x, &y)| {
      let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
      r * r
    })
    .sum()
}

/*
  Fit a, b params for the differentiable curve used in lower
  dimensional fuzzy simplicial complex construction. We want the
  smooth curve 1 / (1 + a x^(2b)) that best matches the offset exponential

    y = 1                               for x < min_dist
    y = exp(-(x - min_dist) / spread)   otherwise

  on 300 evenly spaced points in [0, 3 * spread]. Solved by
  Levenberg-Marquardt in f64 starting from a = b = 1.
*/
pub fn find_ab_params(spread: f32, min_dist: f32) -> (f32, f32) {
  let spread = spread as f64;
  let min_dist = min_dist as f64;
  let xv: Vec<f64> = (0..N_POINTS)
    .map(|i| spread * 3.0 * i as f64 / (N_POINTS - 1) as f64)
    .collect();
  let yv: Vec<f64> = xv
    .iter()
    .map(|&x| {
      if x < min_dist {
        1.0
      } else {
        (-(x - min_dist) / spread).exp()
      }
    })
    .collect();

  let (mut a, mut b) = (1.0f64, 1.0f64);
  let mut lambda = 1e-3;
  let mut error = sse(&xv, &yv, a, b);

  for _ in 0..MAX_ITERATIONS {
    // Normal equations J^T J and J^T r.
    let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in xv.iter().zip(&yv) {
      if x <= 0.0 {
        // f(0) = 1 regardless of a, b.
        continue;
      }
      let x2b = x.powf(2.0 * b);
      let denom = 1.0 + a * x2b;
      let r = 1.0 / denom - y;
      let da = -x2b / (denom * denom);
      let db = -2.0 * a * x2b * x.ln() / (denom * denom);
      jaa += da * da;
      jab += da * db;
      jbb += db * db;
      ga += da * r;
      gb += db * r;
    }

    let mut improved = false;
    while lambda < 1e12 {
      let m_aa = jaa * (1.0 + lambda);
      let m_bb = jbb * (1.0 + lambda);
      let det = m_aa * m_bb - jab * jab;
      if det.abs() < f64::MIN_POSITIVE {
        lambda *= 10.0;
        continue;
      }
      let step_a = -(m_bb * ga - jab * gb) / det;
      let step_b = -(m_aa * gb - jab * ga) / det;
      let (next_a, next_b) = (a + step_a, b + step_b);
      if next_a > 0.0 && next_b > 0.0 {
        let next_error = sse(&xv, &yv, next_a, next_b);
        if next_error < error {
          let converged = (error - next_error) <= 1e-15 * error.max(1e-300);
          a = next_a;
          b = next_b;
          error = next_error;
          lambda = (lambda / 10.0).max(1e-12);
          improved = !converged;
          break;
        }
      }
      lambda *= 10.0;
    }
    if !improved {
      break;
    }
  }

  (a as f32, b as f32)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_parameters() {
    let (a, b) = find_ab_params(1.0, 0.1);
    assert!((a - 1.577).abs() < 0.01, "a = {a}");
    assert!((b - 0.895).abs() < 0.01, "b = {b}");
  }

  #[test]
  fn test_smaller_min_dist_gives_larger_a() {
    let (a_small, _) = find_ab_params(1.0, 0.001);
    let (a_default, _) = find_ab_params(1.0, 0.1);
    assert!(a_small > a_default);
  }
}
