use crate::error::Result;
use crate::error::UmapError;
use serde::Deserialize;
use serde::Serialize;

/// Configuration for manifold shape and embedding space properties.
///
/// These parameters control the geometric properties of the low-dimensional
/// embedding space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifoldParams {
  /// Minimum distance between points in the embedding space.
  ///
  /// Smaller values create more clustered embeddings, larger values spread
  /// points out more.
  ///
  /// Default: 0.1
  pub min_dist: f32,

  /// The effective scale of embedded points.
  ///
  /// Together with `min_dist`, this determines the curve fitted for `a`/`b`.
  ///
  /// Default: 1.0
  pub spread: f32,

  /// Parameter 'a' of the distance-to-probability curve `1 / (1 + a*x^(2b))`.
  ///
  /// If `None`, fitted from `min_dist` and `spread`. Both `a` and `b` must be
  /// set for the override to take effect.
  ///
  /// Default: None
  pub a: Option<f32>,

  /// Parameter 'b' of the distance-to-probability curve `1 / (1 + a*x^(2b))`.
  ///
  /// Default: None
  pub b: Option<f32>,
}

impl Default for ManifoldParams {
  fn default() -> Self {
    Self {
      min_dist: 0.1,
      spread: 1.0,
      a: None,
      b: None,
    }
  }
}

/// Configuration for fuzzy graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphParams {
  /// Number of nearest neighbors (including the point itself) per sample.
  ///
  /// Must be >= 2 and smaller than the number of samples.
  ///
  /// Default: 15
  pub n_neighbors: usize,

  /// Number of nearest neighbors assumed to be fully connected.
  ///
  /// Fractional values interpolate between neighbor distances.
  ///
  /// Default: 1.0
  pub local_connectivity: f32,

  /// Interpolation between fuzzy union (1.0) and fuzzy intersection (0.0).
  ///
  /// Must be in range [0.0, 1.0].
  ///
  /// Default: 1.0
  pub set_op_mix_ratio: f32,

  /// Neighbor distance at or beyond which edges are dropped.
  ///
  /// If `None`, uses the metric's own threshold (infinite for unbounded
  /// metrics).
  ///
  /// Default: None
  pub disconnection_distance: Option<f32>,

  /// Scale applied to the `log2(k)` calibration target.
  ///
  /// Default: 1.0
  pub bandwidth: f32,

  /// Exponent applied to each directed membership strength before the union.
  ///
  /// Values above 1 dampen weak memberships.
  ///
  /// Default: 1.0
  pub membership_exponent: f32,
}

impl Default for GraphParams {
  fn default() -> Self {
    Self {
      n_neighbors: 15,
      local_connectivity: 1.0,
      set_op_mix_ratio: 1.0,
      disconnection_distance: None,
      bandwidth: 1.0,
      membership_exponent: 1.0,
    }
  }
}

/// Configuration for stochastic gradient descent optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationParams {
  /// Number of optimization epochs.
  ///
  /// `None` or `Some(0)` selects the default based on dataset size:
  /// - <= 10,000 samples: 500 epochs
  /// - > 10,000 samples: 200 epochs
  ///
  /// Default: None
  pub n_epochs: Option<usize>,

  /// Initial learning rate. Decays linearly to 0 over the run.
  ///
  /// Default: 1.0
  pub learning_rate: f32,

  /// Number of negative samples per positive sample.
  ///
  /// Default: 5
  pub negative_sample_rate: usize,

  /// Weight applied to negative samples.
  ///
  /// Default: 1.0
  pub repulsion_strength: f32,

  /// Run SGD with lock-free parallel updates.
  ///
  /// Faster on large graphs, but the result is no longer reproducible for a
  /// fixed seed.
  ///
  /// Default: false
  pub parallel: bool,
}

impl Default for OptimizationParams {
  fn default() -> Self {
    Self {
      n_epochs: None,
      learning_rate: 1.0,
      negative_sample_rate: 5,
      repulsion_strength: 1.0,
      parallel: false,
    }
  }
}

/// Configuration for approximate nearest neighbor search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborParams {
  /// Number of random projection trees.
  ///
  /// Default: None (`5 + round(sqrt(n_samples) / 20)`, capped at 64)
  pub n_trees: Option<usize>,

  /// Maximum number of NN-descent iterations.
  ///
  /// Default: None (`max(5, round(log2(n_samples)))`)
  pub n_iters: Option<usize>,

  /// Maximum number of new or old candidates sampled per point per iteration.
  ///
  /// Default: 60
  pub max_candidates: usize,

  /// Early termination threshold, as a fraction of `n_samples * n_neighbors`.
  ///
  /// Default: 0.001
  pub delta: f32,

  /// Maximum points per tree leaf. Must be >= 2.
  ///
  /// Default: None (`max(10, n_neighbors)`)
  pub leaf_size: Option<usize>,
}

impl Default for NeighborParams {
  fn default() -> Self {
    Self {
      n_trees: None,
      n_iters: None,
      max_candidates: 60,
      delta: 0.001,
      leaf_size: None,
    }
  }
}

impl NeighborParams {
  pub(crate) fn resolved_n_trees(&self, n_samples: usize) -> usize {
    self.n_trees.unwrap_or_else(|| {
      let n = 5 + ((n_samples as f64).sqrt() / 20.0).round() as usize;
      n.min(64)
    })
  }

  pub(crate) fn resolved_n_iters(&self, n_samples: usize) -> usize {
    self
      .n_iters
      .unwrap_or_else(|| ((n_samples as f64).log2().round() as usize).max(5))
  }

  pub(crate) fn resolved_leaf_size(&self, n_neighbors: usize) -> usize {
    self.leaf_size.unwrap_or_else(|| n_neighbors.max(10))
  }
}

/// Initialization strategy for the embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitMethod {
  /// Leading eigenvectors of the normalized graph Laplacian.
  #[default]
  Spectral,
  /// Uniform random coordinates in [-10, 10].
  Random,
}

/// Complete UMAP configuration.
///
/// # Example
///
/// ```ignore
/// use umap_engine::config::{UmapConfig, GraphParams};
///
/// let config = UmapConfig {
///   n_components: 3,
///   metric: "cosine".to_string(),
///   graph: GraphParams {
///     n_neighbors: 30,
///     ..Default::default()
///   },
///   ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UmapConfig {
  /// Number of dimensions in the output embedding.
  ///
  /// Default: 2
  pub n_components: usize,

  /// Name of the input space metric, resolved by `NamedMetric::from_name`.
  ///
  /// Ignored when a metric object is supplied via `Umap::with_metric`.
  ///
  /// Default: "euclidean"
  pub metric: String,

  /// Default: Spectral
  pub init: InitMethod,

  /// Seed for every random choice made during fit and transform.
  ///
  /// Default: 42
  pub random_state: u64,

  pub manifold: ManifoldParams,
  pub graph: GraphParams,
  pub optimization: OptimizationParams,
  pub neighbors: NeighborParams,
}

impl Default for UmapConfig {
  fn default() -> Self {
    Self {
      n_components: 2,
      metric: "euclidean".to_string(),
      init: InitMethod::default(),
      random_state: 42,
      manifold: ManifoldParams::default(),
      graph: GraphParams::default(),
      optimization: OptimizationParams::default(),
      neighbors: NeighborParams::default(),
    }
  }
}

impl UmapConfig {
  /// Check parameter ranges that do not depend on the data.
  pub fn validate(&self) -> Result<()> {
    let invalid = |msg: String| Err(UmapError::InvalidParameter(msg));
    if self.n_components < 1 {
      return invalid("n_components must be >= 1".to_string());
    }
    if self.graph.n_neighbors < 2 {
      return invalid(format!(
        "n_neighbors must be >= 2, got {}",
        self.graph.n_neighbors
      ));
    }
    if !(0.0..=1.0).contains(&self.graph.set_op_mix_ratio) {
      return invalid(format!(
        "set_op_mix_ratio must be in [0, 1], got {}",
        self.graph.set_op_mix_ratio
      ));
    }
    if !(self.graph.local_connectivity >= 0.0) {
      return invalid("local_connectivity must be >= 0".to_string());
    }
    if !(self.graph.bandwidth > 0.0) {
      return invalid("bandwidth must be > 0".to_string());
    }
    if !(self.graph.membership_exponent > 0.0) {
      return invalid("membership_exponent must be > 0".to_string());
    }
    if !(self.manifold.spread > 0.0) {
      return invalid("spread must be > 0".to_string());
    }
    if !(self.manifold.min_dist >= 0.0) || self.manifold.min_dist > self.manifold.spread {
      return invalid(format!(
        "min_dist must be in [0, spread], got {}",
        self.manifold.min_dist
      ));
    }
    if !(self.optimization.learning_rate > 0.0) {
      return invalid("learning_rate must be > 0".to_string());
    }
    if !(self.optimization.repulsion_strength >= 0.0) {
      return invalid("repulsion_strength must be >= 0".to_string());
    }
    if self.neighbors.max_candidates < 1 {
      return invalid("max_candidates must be >= 1".to_string());
    }
    if !(self.neighbors.delta >= 0.0) {
      return invalid("delta must be >= 0".to_string());
    }
    if self.neighbors.n_trees == Some(0) {
      return invalid("n_trees must be >= 1".to_string());
    }
    if let Some(leaf_size) = self.neighbors.leaf_size.filter(|&l| l < 2) {
      return invalid(format!("leaf_size must be >= 2, got {leaf_size}"));
    }
    Ok(())
  }

  /// Resolve the epoch count for a dataset of `n_samples` points.
  pub(crate) fn resolved_n_epochs(&self, n_samples: usize) -> usize {
    match self.optimization.n_epochs {
      Some(n) if n > 0 => n,
      _ => crate::optimizer::default_epochs(n_samples),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    assert!(UmapConfig::default().validate().is_ok());
  }

  #[test]
  fn test_rejects_small_n_neighbors() {
    let mut config = UmapConfig::default();
    config.graph.n_neighbors = 1;
    assert!(matches!(
      config.validate(),
      Err(UmapError::InvalidParameter(_))
    ));
  }

  #[test]
  fn test_rejects_degenerate_leaf_size() {
    let mut config = UmapConfig::default();
    for leaf_size in [0, 1] {
      config.neighbors.leaf_size = Some(leaf_size);
      assert!(matches!(
        config.validate(),
        Err(UmapError::InvalidParameter(_))
      ));
    }
    config.neighbors.leaf_size = Some(2);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_default_epochs_depend_on_size() {
    let mut config = UmapConfig::default();
    assert_eq!(config.resolved_n_epochs(10_000), 500);
    assert_eq!(config.resolved_n_epochs(10_001), 200);
    config.optimization.n_epochs = Some(0);
    assert_eq!(config.resolved_n_epochs(100), 500);
    config.optimization.n_epochs = Some(50);
    assert_eq!(config.resolved_n_epochs(100), 50);
  }
}
