use crate::config::UmapConfig;
use crate::embedding::FittedUmap;
use crate::error::Result;
use crate::error::UmapError;
use crate::layout::optimize_layout_euclidean::OptimizeLayoutEuclidean;
use crate::layout::EpochSchedule;
use crate::manifold::LearnedManifold;
use crate::umap::simplicial_set_embedding::simplicial_set_edges;
use crate::umap::simplicial_set_embedding::EdgeList;
use ndarray::Array2;
use ndarray::ArrayView2;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Active optimization state for a UMAP embedding.
///
/// This contains all the state needed to run and resume stochastic gradient
/// descent. It is large and mutable, meant to be used during training and
/// then converted to a lightweight `FittedUmap` when done.
///
/// The optimizer can be serialized between epochs for checkpointing; a
/// restored optimizer continues exactly where the original left off.
#[derive(Debug, Serialize, Deserialize)]
pub struct Optimizer {
  manifold: LearnedManifold,

  // Pruned edges and their sampling state.
  edges: EdgeList,
  schedule: EpochSchedule,

  embedding: Array2<f32>,

  current_epoch: usize,
  total_epochs: usize,

  gamma: f32,
  initial_alpha: f32,
  seed: u64,
  parallel: bool,
}

/// Default number of epochs for a dataset of `n_samples` points.
pub(crate) fn default_epochs(n_samples: usize) -> usize {
  if n_samples <= 10_000 {
    500
  } else {
    200
  }
}

/// Rescale every column of `embedding` linearly onto [0, 10].
fn normalize_columns(embedding: &mut Array2<f32>) {
  for mut column in embedding.columns_mut() {
    let min = column.iter().copied().fold(f32::INFINITY, f32::min);
    let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range > 0.0 {
      column.mapv_inplace(|v| 10.0 * (v - min) / range);
    }
  }
}

impl Optimizer {
  /// Create a new optimizer from a learned manifold.
  ///
  /// This performs preprocessing:
  /// - Prunes edges too weak to be sampled within `total_epochs`
  /// - Extracts head/tail edge lists and their sampling periods
  /// - Normalizes the initial embedding to [0, 10] per dimension
  ///
  /// Fails with `ShapeMismatch` if `init` does not have one row per vertex
  /// and `config.n_components` columns, or `NonFiniteValue` if it holds a
  /// NaN or infinity.
  pub fn new(
    manifold: LearnedManifold,
    init: Array2<f32>,
    total_epochs: usize,
    config: &UmapConfig,
  ) -> Result<Self> {
    if init.nrows() != manifold.n_vertices || init.ncols() != config.n_components {
      return Err(UmapError::ShapeMismatch(format!(
        "init has shape {:?}, expected ({}, {})",
        init.dim(),
        manifold.n_vertices,
        config.n_components
      )));
    }
    if let Some(((row, column), _)) = init.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(UmapError::NonFiniteValue { row, column });
    }

    let edges = simplicial_set_edges(
      &manifold.graph,
      total_epochs,
      default_epochs(manifold.n_vertices),
    );
    let schedule = EpochSchedule::new(&edges, config.optimization.negative_sample_rate);

    let mut embedding = init;
    normalize_columns(&mut embedding);

    Ok(Self {
      manifold,
      edges,
      schedule,
      embedding,
      current_epoch: 0,
      total_epochs,
      gamma: config.optimization.repulsion_strength,
      initial_alpha: config.optimization.learning_rate,
      seed: config.random_state,
      parallel: config.optimization.parallel,
    })
  }

  /// Run `n` more epochs of stochastic gradient descent.
  ///
  /// Fails with `InvalidParameter` if this would exceed `total_epochs`;
  /// check `remaining_epochs()` first.
  pub fn step_epochs(&mut self, n: usize) -> Result<()> {
    if self.current_epoch + n > self.total_epochs {
      return Err(UmapError::InvalidParameter(format!(
        "cannot step {n} epochs: {} of {} already run",
        self.current_epoch, self.total_epochs
      )));
    }

    let started = Instant::now();
    let (a, b) = self.manifold.curve_params();
    let start_epoch = self.current_epoch;
    let end_epoch = start_epoch + n;
    for epoch in start_epoch..end_epoch {
      let alpha = self.initial_alpha * (1.0 - epoch as f32 / self.total_epochs as f32);
      OptimizeLayoutEuclidean::builder()
        .head_embedding(self.embedding.view_mut())
        .edges(&self.edges)
        .schedule(&mut self.schedule)
        .a(a)
        .b(b)
        .gamma(self.gamma)
        .alpha(alpha)
        .epoch(epoch)
        .seed(self.seed)
        .parallel(self.parallel)
        .build()
        .exec();
    }
    self.current_epoch = end_epoch;
    debug!(
      duration_ms = started.elapsed().as_millis(),
      start_epoch, end_epoch, "optimizer step complete"
    );
    Ok(())
  }

  pub fn current_epoch(&self) -> usize {
    self.current_epoch
  }

  pub fn total_epochs(&self) -> usize {
    self.total_epochs
  }

  pub fn remaining_epochs(&self) -> usize {
    self.total_epochs - self.current_epoch
  }

  /// Number of edges kept for optimization after pruning.
  pub fn n_edges(&self) -> usize {
    self.edges.len()
  }

  pub fn embedding(&self) -> ArrayView2<'_, f32> {
    self.embedding.view()
  }

  pub fn manifold(&self) -> &LearnedManifold {
    &self.manifold
  }

  /// Consume the optimizer and return a lightweight fitted model.
  ///
  /// The model has no reference index, so it cannot transform new data.
  pub fn into_fitted(self, config: UmapConfig) -> FittedUmap {
    FittedUmap {
      manifold: self.manifold,
      embedding: self.embedding,
      config,
      reference_index: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_columns() {
    let mut embedding = ndarray::array![[-1.0f32, 5.0], [1.0, 5.0], [0.0, 5.0]];
    normalize_columns(&mut embedding);
    assert_eq!(embedding.column(0).to_vec(), vec![0.0, 10.0, 5.0]);
    // A constant column is left alone.
    assert_eq!(embedding.column(1).to_vec(), vec![5.0, 5.0, 5.0]);
  }
}
