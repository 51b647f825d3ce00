use ndarray::Array1;
use ndarray::ArrayView1;

/*
  Given a set of weights and number of epochs generate the number of
  epochs per sample for each weight.

  An edge of weight w is sampled every max_w / w epochs, so the strongest
  edge is sampled every epoch. Edges that would be sampled fewer than once
  over the whole run are marked with -1 and never sampled.
*/
pub fn make_epochs_per_sample(weights: ArrayView1<f32>, n_epochs: usize) -> Array1<f64> {
  let max_weight = weights.iter().copied().fold(0.0f32, f32::max);
  if max_weight <= 0.0 {
    return Array1::from_elem(weights.len(), -1.0);
  }

  weights.mapv(|w| {
    let n_samples = n_epochs as f64 * (w as f64 / max_weight as f64);
    if n_samples > 0.0 {
      n_epochs as f64 / n_samples
    } else {
      -1.0
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;

  #[test]
  fn test_period_is_inverse_relative_weight() {
    let weights = array![1.0f32, 0.5, 0.25, 0.0];
    let eps = make_epochs_per_sample(weights.view(), 200);
    assert_eq!(eps.to_vec(), vec![1.0, 2.0, 4.0, -1.0]);
  }
}
