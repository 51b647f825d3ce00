use super::fuzzy_simplicial_set::SparseMat;
use super::make_epochs_per_sample::make_epochs_per_sample;
use ndarray::Array1;
use serde::Deserialize;
use serde::Serialize;

/// The 1-simplices an embedding is optimized over, in row-major graph order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeList {
  pub head: Array1<u32>,
  pub tail: Array1<u32>,
  pub epochs_per_sample: Array1<f64>,
}

impl EdgeList {
  pub fn len(&self) -> usize {
    self.head.len()
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_empty()
  }
}

/*
  Prepare the edges of a fuzzy graph for layout optimization.

  Edges weaker than max_weight / n_epochs could never be sampled during the
  run and are dropped. When n_epochs is tiny (<= 10) the threshold uses
  `default_epochs` instead so a short run does not keep every weak edge.
  Each kept edge gets its sampling period max_weight / weight.

  Rows are heads and columns are tails, so a bipartite (query x reference)
  graph gives heads in query space and tails in reference space.
*/
pub fn simplicial_set_edges(graph: &SparseMat, n_epochs: usize, default_epochs: usize) -> EdgeList {
  let max_weight = graph.data().iter().copied().fold(0.0f32, f32::max);
  let threshold_epochs = if n_epochs > 10 {
    n_epochs
  } else {
    default_epochs
  };
  let threshold = max_weight / threshold_epochs as f32;

  let mut head = Vec::new();
  let mut tail = Vec::new();
  let mut weights = Vec::new();
  for (row, vec) in graph.outer_iterator().enumerate() {
    for (col, &w) in vec.iter() {
      if w > 0.0 && w >= threshold {
        head.push(row as u32);
        tail.push(col as u32);
        weights.push(w);
      }
    }
  }

  let weights = Array1::from(weights);
  let epochs_per_sample = make_epochs_per_sample(weights.view(), n_epochs.max(1));
  EdgeList {
    head: Array1::from(head),
    tail: Array1::from(tail),
    epochs_per_sample,
  }
}
