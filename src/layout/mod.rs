pub mod optimize_layout_euclidean;

use crate::umap::simplicial_set_embedding::EdgeList;
use serde::Deserialize;
use serde::Serialize;

/// Per-edge SGD sampling state, carried between epochs so an optimization
/// run can be paused and resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochSchedule {
  pub epoch_of_next_sample: Vec<f64>,
  pub epoch_of_next_negative_sample: Vec<f64>,
  pub epochs_per_negative_sample: Vec<f64>,
}

impl EpochSchedule {
  pub fn new(edges: &EdgeList, negative_sample_rate: usize) -> Self {
    let epochs_per_negative_sample: Vec<f64> = edges
      .epochs_per_sample
      .iter()
      .map(|&eps| eps / negative_sample_rate as f64)
      .collect();
    Self {
      epoch_of_next_sample: edges.epochs_per_sample.to_vec(),
      epoch_of_next_negative_sample: epochs_per_negative_sample.clone(),
      epochs_per_negative_sample,
    }
  }
}
