use crate::config::InitMethod;
use crate::config::UmapConfig;
use crate::data::Dataset;
use crate::distances::NamedMetric;
use crate::error::Result;
use crate::error::UmapError;
use crate::layout::optimize_layout_euclidean::OptimizeLayoutEuclidean;
use crate::layout::EpochSchedule;
use crate::manifold::LearnedManifold;
use crate::metric::Metric;
use crate::neighbors::NearestNeighbors;
use crate::neighbors::ReferenceIndex;
use crate::optimizer::Optimizer;
use crate::umap::compute_membership_strengths::ComputeMembershipStrengths;
use crate::umap::find_ab_params::find_ab_params;
use crate::umap::fuzzy_simplicial_set::FuzzySimplicialSet;
use crate::umap::init_graph_transform::exact_matches;
use crate::umap::init_graph_transform::init_graph_transform;
use crate::umap::raise_disconnected_warning::raise_disconnected_warning;
use crate::umap::simplicial_set_embedding::simplicial_set_edges;
use crate::umap::smooth_knn_dist::SmoothKnnDist;
use crate::umap::spectral::random_layout;
use crate::umap::spectral::SpectralLayout;
use crate::umap::SparseMat;
use crate::utils::rng::mix_seed;
use dashmap::DashSet;
use itertools::izip;
use itertools::Itertools;
use ndarray::Array2;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use serde::Deserialize;
use serde::Serialize;
use sprs::TriMatI;
use std::time::Instant;
use tracing::info;

/// Seed streams derived from `random_state` for the transform phases, kept
/// apart from the per-epoch streams of the fit.
const TRANSFORM_QUERY_STREAM: u64 = 1 << 40;
const TRANSFORM_LAYOUT_STREAM: u64 = (1 << 40) + 1;

/// Share of rows that may be disconnected before the louder warning.
const DISCONNECTED_WARNING_SHARE: f64 = 0.1;

/// UMAP dimensionality reduction.
///
/// Holds the configuration and, optionally, a custom input-space metric. It
/// can be reused to fit several datasets with the same parameters.
///
/// # Example
///
/// ```ignore
/// use umap_engine::{Umap, UmapConfig};
///
/// let umap = Umap::new(UmapConfig::default());
/// let fitted = umap.fit(data)?;
/// let embedding = fitted.embedding();
///
/// // Place unseen points against the fitted embedding.
/// let placed = umap.transform(&fitted, new_data)?;
/// ```
///
/// For checkpointed training use the lower-level API: `learn_manifold`,
/// then `Optimizer::new`, `step_epochs` and `into_fitted`.
pub struct Umap {
  config: UmapConfig,
  metric: Option<Box<dyn Metric>>,
}

impl Umap {
  /// A UMAP instance using the named metric in `config.metric`.
  pub fn new(config: UmapConfig) -> Self {
    Self {
      config,
      metric: None,
    }
  }

  /// A UMAP instance with a custom input-space metric. `config.metric` is
  /// ignored.
  pub fn with_metric(config: UmapConfig, metric: Box<dyn Metric>) -> Self {
    Self {
      config,
      metric: Some(metric),
    }
  }

  pub fn config(&self) -> &UmapConfig {
    &self.config
  }

  /// Run `f` with the input-space metric: the custom one, or the metric
  /// named in `config` checked against `n_features` when given.
  fn with_resolved_metric<T>(
    &self,
    config: &UmapConfig,
    n_features: Option<usize>,
    f: impl FnOnce(&dyn Metric) -> Result<T>,
  ) -> Result<T> {
    match &self.metric {
      Some(metric) => f(metric.as_ref()),
      None => {
        let named = NamedMetric::from_name(&config.metric)?;
        if let Some(n_features) = n_features {
          named.check_dimension(n_features)?;
        }
        f(&named)
      }
    }
  }

  /// Fit the model to `data`: approximate kNN graph, fuzzy graph,
  /// initialization and layout optimization.
  ///
  /// The returned model keeps the data as a reference index for
  /// `transform`. Fails before any work is done if the configuration is
  /// invalid, the metric is unknown or incompatible with the data, the data
  /// is empty or non-finite, or `n_neighbors >= n_samples`.
  pub fn fit(&self, data: impl Into<Dataset>) -> Result<FittedUmap> {
    let data = data.into();
    let config = &self.config;
    config.validate()?;
    data.validate()?;
    let n_samples = data.n_samples();
    check_neighbor_count(config.graph.n_neighbors, n_samples)?;

    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(config.random_state);

    let (mut fitted, forest, knn_indices) =
      self.with_resolved_metric(config, Some(data.n_features()), |metric| {
        let knn = NearestNeighbors::builder()
          .data(&data)
          .metric(metric)
          .n_neighbors(config.graph.n_neighbors)
          .params(&config.neighbors)
          .build()
          .exec(&mut rng);

        let manifold = self.learn_manifold_with(
          knn.indices.view(),
          knn.distances.view(),
          metric.disconnection_threshold(),
        )?;
        let fitted = self.optimize(manifold, None, &mut rng)?;
        Ok((fitted, knn.forest, knn.indices))
      })?;

    fitted.reference_index = Some(ReferenceIndex::new(data, forest, knn_indices.view()));
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_samples, "fit complete"
    );
    Ok(fitted)
  }

  /// Fit from a precomputed k-nearest neighbor graph.
  ///
  /// `knn_indices` and `knn_dists` have one row per point and
  /// `n_neighbors` columns; column 0 is conventionally the point itself.
  /// Indices >= n_samples are treated as missing neighbors. `init`
  /// overrides `config.init` when given.
  ///
  /// The returned model has no reference index, so `transform` on it
  /// fails with `NotFitted`.
  pub fn fit_precomputed(
    &self,
    knn_indices: ArrayView2<u32>,
    knn_dists: ArrayView2<f32>,
    init: Option<ArrayView2<f32>>,
  ) -> Result<FittedUmap> {
    let started = Instant::now();
    let manifold = self.learn_manifold(knn_indices, knn_dists)?;
    let mut rng = StdRng::seed_from_u64(self.config.random_state);
    let fitted = self.optimize(manifold, init, &mut rng)?;
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_samples = knn_indices.nrows(),
      "fit_precomputed complete"
    );
    Ok(fitted)
  }

  /// Learn the manifold structure from a precomputed kNN graph.
  ///
  /// This is the expensive graph construction phase. The result can be
  /// cached, serialized and reused for several optimizations. It is
  /// deterministic and independent of the embedding dimension.
  pub fn learn_manifold(
    &self,
    knn_indices: ArrayView2<u32>,
    knn_dists: ArrayView2<f32>,
  ) -> Result<LearnedManifold> {
    self.config.validate()?;
    validate_knn(&self.config, knn_indices, knn_dists)?;
    self.with_resolved_metric(&self.config, None, |metric| {
      self.learn_manifold_with(knn_indices, knn_dists, metric.disconnection_threshold())
    })
  }

  fn learn_manifold_with(
    &self,
    knn_indices: ArrayView2<u32>,
    knn_dists: ArrayView2<f32>,
    metric_threshold: f32,
  ) -> Result<LearnedManifold> {
    let config = &self.config;
    let n_samples = knn_indices.nrows();

    let (a, b) = match (config.manifold.a, config.manifold.b) {
      (Some(a), Some(b)) => (a, b),
      _ => find_ab_params(config.manifold.spread, config.manifold.min_dist),
    };

    let disconnection_distance = config
      .graph
      .disconnection_distance
      .unwrap_or(metric_threshold);

    let started = Instant::now();
    let knn_disconnections = find_disconnections(knn_dists, disconnection_distance);
    let edges_removed = knn_disconnections.len();
    info!(
      duration_ms = started.elapsed().as_millis(),
      edges_removed, "disconnection detection complete"
    );

    info!(
      n_samples,
      n_neighbors = config.graph.n_neighbors,
      "starting fuzzy simplicial set"
    );
    let started = Instant::now();
    let (graph, sigmas, rhos) = FuzzySimplicialSet::builder()
      .n_samples(n_samples)
      .n_neighbors(config.graph.n_neighbors)
      .knn_indices(knn_indices)
      .knn_dists(knn_dists)
      .knn_disconnections(&knn_disconnections)
      .set_op_mix_ratio(config.graph.set_op_mix_ratio)
      .local_connectivity(config.graph.local_connectivity)
      .bandwidth(config.graph.bandwidth)
      .membership_exponent(config.graph.membership_exponent)
      .build()
      .exec();
    info!(
      duration_ms = started.elapsed().as_millis(),
      "fuzzy simplicial set complete"
    );

    let manifold = LearnedManifold {
      graph,
      sigmas,
      rhos,
      n_vertices: n_samples,
      a,
      b,
    };
    raise_disconnected_warning(
      edges_removed,
      manifold.disconnected_vertices().len(),
      disconnection_distance,
      n_samples,
      DISCONNECTED_WARNING_SHARE,
    );
    Ok(manifold)
  }

  /// Initialize and run the full optimization of a learned manifold.
  fn optimize(
    &self,
    manifold: LearnedManifold,
    init: Option<ArrayView2<f32>>,
    rng: &mut StdRng,
  ) -> Result<FittedUmap> {
    let config = &self.config;
    let n_samples = manifold.n_vertices();
    let init = match init {
      Some(init) => init.to_owned(),
      None => match config.init {
        InitMethod::Spectral => SpectralLayout::builder()
          .graph(manifold.graph())
          .dim(config.n_components)
          .build()
          .exec(rng),
        InitMethod::Random => random_layout(n_samples, config.n_components, rng),
      },
    };

    let total_epochs = config.resolved_n_epochs(n_samples);
    let started = Instant::now();
    let mut optimizer = Optimizer::new(manifold, init, total_epochs, config)?;
    optimizer.step_epochs(total_epochs)?;
    info!(
      duration_ms = started.elapsed().as_millis(),
      total_epochs,
      n_edges = optimizer.n_edges(),
      "optimize_layout complete"
    );
    Ok(optimizer.into_fitted(config.clone()))
  }

  /*
    Embed new points into the space of a fitted model.

    Each point is searched against the fitted data (forest leaves, random
    fill, then best-first search over the fitted kNN graph), calibrated
    against its own neighbor distances exactly as fitted points are, and
    linked to its neighbors by bipartite membership strengths, so its
    nearest fitted neighbor gets full membership. A point at distance 0
    from a fitted point starts on it; any other starts at the
    membership-weighted mean of its neighbors' coordinates. It is then
    optimized with the fitted points held fixed, for a third of the fit
    epochs (100, or 30 for more than 10k fitted points, by default) at a
    quarter of the learning rate.
  */
  pub fn transform(&self, fitted: &FittedUmap, new_data: impl Into<Dataset>) -> Result<Array2<f32>> {
    let index = fitted.reference_index.as_ref().ok_or(UmapError::NotFitted)?;
    let new_data = new_data.into();
    new_data.validate()?;
    let expected = index.data().n_features();
    if new_data.n_features() != expected {
      return Err(UmapError::DimensionMismatch {
        expected,
        found: new_data.n_features(),
      });
    }

    let config = &fitted.config;
    let started = Instant::now();
    let n_reference = index.n_samples();
    let n_neighbors = config.graph.n_neighbors;
    let query_seed = mix_seed(config.random_state, TRANSFORM_QUERY_STREAM);

    let (graph, exact, disconnection_distance) =
      self.with_resolved_metric(config, Some(expected), |metric| {
        let (indices, dists) = index.query(&new_data, metric, n_neighbors, query_seed);
        let disconnection_distance = config
          .graph
          .disconnection_distance
          .unwrap_or(metric.disconnection_threshold());
        let graph = transform_graph(config, indices.view(), dists.view(), n_reference, disconnection_distance);
        let exact = exact_matches(indices.view(), dists.view(), n_reference);
        Ok((graph, exact, disconnection_distance))
      })?;

    let n_new = new_data.n_samples();
    let unplaced = graph
      .outer_iterator()
      .filter(|row| row.data().iter().all(|&w| w == 0.0))
      .count();
    raise_disconnected_warning(0, unplaced, disconnection_distance, n_new, DISCONNECTED_WARNING_SHARE);

    let mut embedding = init_graph_transform(&graph, &exact, fitted.embedding.view());

    let n_epochs = match config.optimization.n_epochs {
      Some(n) if n > 0 => n / 3,
      _ => transform_default_epochs(n_reference),
    };
    if n_epochs > 0 {
      let edges = simplicial_set_edges(&graph, n_epochs, transform_default_epochs(n_reference));
      let mut schedule = EpochSchedule::new(&edges, config.optimization.negative_sample_rate);
      let initial_alpha = config.optimization.learning_rate / 4.0;
      let layout_seed = mix_seed(config.random_state, TRANSFORM_LAYOUT_STREAM);
      for epoch in 0..n_epochs {
        OptimizeLayoutEuclidean::builder()
          .head_embedding(embedding.view_mut())
          .tail_embedding(Some(fitted.embedding.view()))
          .edges(&edges)
          .schedule(&mut schedule)
          .a(fitted.manifold.a)
          .b(fitted.manifold.b)
          .gamma(config.optimization.repulsion_strength)
          .alpha(initial_alpha * (1.0 - epoch as f32 / n_epochs as f32))
          .epoch(epoch)
          .seed(layout_seed)
          .parallel(config.optimization.parallel)
          .build()
          .exec();
      }
    }

    info!(
      duration_ms = started.elapsed().as_millis(),
      n_new, n_epochs, "transform complete"
    );
    Ok(embedding)
  }
}

fn transform_default_epochs(n_reference: usize) -> usize {
  if n_reference <= 10_000 {
    100
  } else {
    30
  }
}

fn check_neighbor_count(n_neighbors: usize, n_samples: usize) -> Result<()> {
  if n_neighbors >= n_samples {
    return Err(UmapError::InvalidParameter(format!(
      "n_neighbors ({n_neighbors}) must be < number of samples ({n_samples})"
    )));
  }
  Ok(())
}

/// Shape and content checks for a precomputed kNN graph.
fn validate_knn(config: &UmapConfig, knn_indices: ArrayView2<u32>, knn_dists: ArrayView2<f32>) -> Result<()> {
  if knn_indices.dim() != knn_dists.dim() {
    return Err(UmapError::ShapeMismatch(format!(
      "knn_indices has shape {:?} but knn_dists has shape {:?}",
      knn_indices.dim(),
      knn_dists.dim()
    )));
  }
  let n_samples = knn_indices.nrows();
  if n_samples == 0 {
    return Err(UmapError::EmptyDataset);
  }
  if knn_indices.ncols() != config.graph.n_neighbors {
    return Err(UmapError::ShapeMismatch(format!(
      "knn arrays have {} columns but n_neighbors is {}",
      knn_indices.ncols(),
      config.graph.n_neighbors
    )));
  }
  check_neighbor_count(config.graph.n_neighbors, n_samples)?;
  if let Some(((row, column), _)) = knn_dists.indexed_iter().find(|(_, d)| d.is_nan()) {
    return Err(UmapError::NonFiniteValue { row, column });
  }
  if knn_dists.iter().any(|&d| d < 0.0) {
    return Err(UmapError::InvalidParameter(
      "knn_dists must be non-negative".to_string(),
    ));
  }
  for (row, indices) in knn_indices.outer_iter().enumerate() {
    let mut present = indices.iter().filter(|&&j| (j as usize) < n_samples);
    if !present.all_unique() {
      return Err(UmapError::InvalidParameter(format!(
        "knn_indices row {row} lists a neighbor twice"
      )));
    }
  }
  Ok(())
}

/// kNN entries at or beyond `disconnection_distance`, as (row, column)
/// positions.
fn find_disconnections(knn_dists: ArrayView2<f32>, disconnection_distance: f32) -> DashSet<(usize, usize)> {
  let knn_disconnections = DashSet::new();
  (0..knn_dists.nrows()).into_par_iter().for_each(|row_no| {
    for (col_no, &dist) in knn_dists.row(row_no).iter().enumerate() {
      if dist >= disconnection_distance {
        knn_disconnections.insert((row_no, col_no));
      }
    }
  });
  knn_disconnections
}

/// Bipartite membership graph (new points x fitted points) of a transform.
fn transform_graph(
  config: &UmapConfig,
  knn_indices: ArrayView2<u32>,
  knn_dists: ArrayView2<f32>,
  n_reference: usize,
  disconnection_distance: f32,
) -> SparseMat {
  let knn_disconnections = find_disconnections(knn_dists, disconnection_distance);
  let (sigmas, rhos) = SmoothKnnDist::builder()
    .distances(knn_dists)
    .k(knn_indices.ncols())
    .local_connectivity(config.graph.local_connectivity)
    .bandwidth(config.graph.bandwidth)
    .skip_self(false)
    .build()
    .exec();
  let (rows, cols, vals) = ComputeMembershipStrengths::builder()
    .knn_indices(knn_indices)
    .knn_dists(knn_dists)
    .knn_disconnections(&knn_disconnections)
    .sigmas(sigmas.view())
    .rhos(rhos.view())
    .n_columns(n_reference)
    .exponent(config.graph.membership_exponent)
    .bipartite(true)
    .build()
    .exec();

  let mut tri = TriMatI::<f32, u32>::with_capacity((knn_indices.nrows(), n_reference), vals.len());
  for (&r, &c, &v) in izip!(rows.iter(), cols.iter(), vals.iter()) {
    if v > 0.0 {
      tri.add_triplet(r as usize, c as usize, v);
    }
  }
  tri.to_csr::<u32>()
}

/// A fitted UMAP model: the embedding, the learned manifold, the
/// configuration used and, when fitted on raw data, the reference index
/// needed by `Umap::transform`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedUmap {
  pub(crate) embedding: Array2<f32>,
  pub(crate) manifold: LearnedManifold,
  pub(crate) config: UmapConfig,
  pub(crate) reference_index: Option<ReferenceIndex>,
}

impl FittedUmap {
  /// The embedding, one row per fitted point.
  pub fn embedding(&self) -> ArrayView2<'_, f32> {
    self.embedding.view()
  }

  /// Consume the model and return the embedding without copying it.
  pub fn into_embedding(self) -> Array2<f32> {
    self.embedding
  }

  pub fn manifold(&self) -> &LearnedManifold {
    &self.manifold
  }

  pub fn config(&self) -> &UmapConfig {
    &self.config
  }

  /// `None` for models fitted from precomputed neighbors.
  pub fn reference_index(&self) -> Option<&ReferenceIndex> {
    self.reference_index.as_ref()
  }
}
