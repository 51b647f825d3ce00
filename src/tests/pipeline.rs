use super::fixtures;
use crate::metric::Metric;
use crate::trustworthiness;
use crate::InitMethod;
use crate::NamedMetric;
use crate::Optimizer;
use crate::Umap;
use crate::UmapConfig;
use crate::UmapError;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

fn iris_config() -> UmapConfig {
  let mut config = UmapConfig::default();
  config.graph.n_neighbors = 10;
  config.manifold.min_dist = 0.01;
  config.random_state = 42;
  config
}

fn assert_finite(embedding: ndarray::ArrayView2<f32>) {
  assert!(embedding.iter().all(|v| v.is_finite()));
}

#[test]
fn test_umap_trustworthiness_on_iris() {
  let data = fixtures::iris();
  let fitted = Umap::new(iris_config()).fit(data.clone()).unwrap();

  assert_eq!(fitted.embedding().dim(), (150, 2));
  assert_finite(fitted.embedding());
  let trust = trustworthiness(data.view(), fitted.embedding(), 10).unwrap();
  assert!(trust >= 0.97, "insufficiently trustworthy embedding: {trust}");
}

/// Fit on a seeded 75% of iris and transform the rest; returns the
/// trustworthiness of the transformed points.
fn held_out_iris_trustworthiness(split_seed: u64) -> f64 {
  let (train, held_out) = fixtures::split_rows(&fixtures::iris(), 0.75, split_seed);
  let umap = Umap::new(iris_config());
  let fitted = umap.fit(train).unwrap();

  let placed = umap.transform(&fitted, held_out.clone()).unwrap();
  assert_eq!(placed.dim(), (held_out.nrows(), 2));
  assert_finite(placed.view());
  trustworthiness(held_out.view(), placed.view(), 10).unwrap()
}

#[test]
fn test_umap_transform_on_iris() {
  // A held-out quarter is only ~37 points, so one split is noisy.
  let scores: Vec<f64> = [42, 1, 2, 3]
    .into_iter()
    .map(held_out_iris_trustworthiness)
    .collect();
  let mean = scores.iter().sum::<f64>() / scores.len() as f64;
  assert!(
    mean >= 0.95,
    "insufficiently trustworthy transform: mean {mean} over {scores:?}"
  );
}

#[test]
fn test_transform_of_fitted_points_lands_near_their_embedding() {
  let data = fixtures::iris();
  let umap = Umap::new(iris_config());
  let fitted = umap.fit(data.clone()).unwrap();
  let placed = umap.transform(&fitted, data.clone()).unwrap();

  // Each re-embedded point should sit among its own fitted neighborhood.
  let embedding = fitted.embedding();
  let span = embedding
    .axis_iter(Axis(1))
    .map(|c| {
      let min = c.iter().copied().fold(f32::INFINITY, f32::min);
      let max = c.iter().copied().fold(f32::NEG_INFINITY, f32::max);
      max - min
    })
    .fold(0.0f32, f32::max);
  let close = (0..data.nrows())
    .filter(|&i| {
      let d: f32 = placed
        .row(i)
        .iter()
        .zip(embedding.row(i))
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt();
      d < 0.1 * span
    })
    .count();
  assert!(close as f64 >= 0.9 * data.nrows() as f64, "only {close} close");
}

#[test]
fn test_blobs_keep_their_separation() {
  let (data, labels) = fixtures::blobs(100, 2, 5, 0.5, 20.0, 7);
  let mut config = UmapConfig::default();
  config.graph.n_neighbors = 4;
  config.random_state = 42;
  let fitted = Umap::new(config).fit(data.clone()).unwrap();
  assert_finite(fitted.embedding());

  /*
    Cluster the embedding, then compare each true blob center with the data
    space center of the embedding cluster its first point landed in. Both
    sides are normalized to unit length.
  */
  let clusters = fixtures::kmeans(fitted.embedding(), 5, 50);
  let normalized = |v: Vec<f32>| -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
  };
  let center_of = |members: Vec<usize>| -> Vec<f32> {
    let points = data.select(Axis(0), &members);
    points.mean_axis(Axis(0)).unwrap().to_vec()
  };

  let mut error = 0.0f32;
  for blob in 0..5 {
    let members: Vec<usize> = (0..100).filter(|&i| labels[i] == blob).collect();
    let cluster = clusters[members[0]];
    let cluster_members: Vec<usize> = (0..100).filter(|&i| clusters[i] == cluster).collect();
    let truth = normalized(center_of(members));
    let found = normalized(center_of(cluster_members));
    error += truth.iter().zip(&found).map(|(a, b)| (a - b) * (a - b)).sum::<f32>();
  }
  assert!(error < 15.0, "blob centers drifted: {error}");
}

#[test]
fn test_same_seed_gives_identical_embeddings() {
  let mut config = iris_config();
  config.optimization.n_epochs = Some(50);
  let first = Umap::new(config.clone()).fit(fixtures::iris()).unwrap();
  let second = Umap::new(config).fit(fixtures::iris()).unwrap();
  assert_eq!(first.embedding(), second.embedding());
}

#[test]
fn test_different_seeds_give_different_embeddings() {
  let mut config = iris_config();
  config.optimization.n_epochs = Some(50);
  let first = Umap::new(config.clone()).fit(fixtures::iris()).unwrap();
  config.random_state = 7;
  let second = Umap::new(config).fit(fixtures::iris()).unwrap();
  assert_ne!(first.embedding(), second.embedding());
}

#[test]
fn test_random_init_three_components() {
  let mut config = iris_config();
  config.n_components = 3;
  config.init = InitMethod::Random;
  config.optimization.n_epochs = Some(100);
  let fitted = Umap::new(config).fit(fixtures::iris()).unwrap();
  assert_eq!(fitted.embedding().dim(), (150, 3));
  assert_finite(fitted.embedding());
}

#[test]
fn test_parallel_optimization_runs() {
  let mut config = iris_config();
  config.optimization.parallel = true;
  config.optimization.n_epochs = Some(100);
  let fitted = Umap::new(config).fit(fixtures::iris()).unwrap();
  assert_finite(fitted.embedding());
}

#[test]
fn test_umap_sparse_trustworthiness() {
  let (_, dense) = fixtures::sparse_uniform_with_zeros(1000, 5, 0.34, 7);
  let dense = dense.slice(ndarray::s![..100, ..]).to_owned();
  let sparse = fixtures::to_csr(&dense);

  let mut config = UmapConfig::default();
  config.graph.n_neighbors = 10;
  let fitted = Umap::new(config).fit(sparse).unwrap();
  let trust = trustworthiness(dense.view(), fitted.embedding(), 10).unwrap();
  assert!(trust >= 0.92, "sparse trustworthiness {trust}");
}

#[test]
fn test_sparse_input_fit_and_transform() {
  let data = fixtures::iris();
  let sparse = fixtures::to_csr(&data);

  let umap = Umap::new(iris_config());
  let fitted = umap.fit(sparse.clone()).unwrap();
  assert_eq!(fitted.embedding().dim(), (150, 2));
  let trust = trustworthiness(data.view(), fitted.embedding(), 10).unwrap();
  assert!(trust >= 0.95, "sparse trustworthiness {trust}");

  // Dense queries against a sparse reference.
  let placed = umap.transform(&fitted, data.slice(ndarray::s![..5, ..]).to_owned()).unwrap();
  assert_eq!(placed.dim(), (5, 2));
  assert_finite(placed.view());
}

#[derive(Debug)]
struct SquaredEuclidean;

impl Metric for SquaredEuclidean {
  fn distance(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
  }
}

#[test]
fn test_custom_metric() {
  let mut config = iris_config();
  config.metric = "not-a-metric".to_string();
  config.optimization.n_epochs = Some(200);
  let fitted = Umap::with_metric(config, Box::new(SquaredEuclidean))
    .fit(fixtures::iris())
    .unwrap();
  assert_eq!(fitted.embedding().dim(), (150, 2));
  assert_finite(fitted.embedding());
}

#[test]
fn test_bounded_metric_fit() {
  let mut config = iris_config();
  config.metric = "correlation".to_string();
  config.optimization.n_epochs = Some(100);
  let fitted = Umap::new(config).fit(fixtures::iris()).unwrap();
  assert_finite(fitted.embedding());
}

#[test]
fn test_fit_precomputed_with_init() {
  let data = fixtures::iris();
  let config = iris_config();
  let reference = Umap::new(config.clone()).fit(data).unwrap();
  let index = reference.reference_index().unwrap();

  // Rebuild the exact kNN graph of the fitted data.
  let n = index.n_samples();
  let mut knn_indices = Array2::<u32>::zeros((n, 10));
  let mut knn_dists = Array2::<f32>::zeros((n, 10));
  for i in 0..n {
    let mut order: Vec<(f32, usize)> = (0..n)
      .map(|j| (index.data().distance(&NamedMetric::Euclidean, i, j), j))
      .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0).then((a.1 != i).cmp(&(b.1 != i))));
    for (c, &(d, j)) in order.iter().take(10).enumerate() {
      knn_indices[(i, c)] = j as u32;
      knn_dists[(i, c)] = d;
    }
  }

  let init = Array2::from_shape_fn((n, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f32);
  let umap = Umap::new(config);
  let fitted = umap
    .fit_precomputed(knn_indices.view(), knn_dists.view(), Some(init.view()))
    .unwrap();
  assert_eq!(fitted.embedding().dim(), (n, 2));
  assert!(fitted.reference_index().is_none());
  assert!(matches!(
    umap.transform(&fitted, fixtures::iris()),
    Err(UmapError::NotFitted)
  ));
}

#[test]
fn test_optimizer_step_epochs() {
  let config = iris_config();
  let umap = Umap::new(config.clone());
  let fitted = umap.fit(fixtures::iris()).unwrap();
  let manifold = fitted.manifold().clone();

  let init = fitted.embedding().to_owned();
  let mut opt = Optimizer::new(manifold, init, 20, &config).unwrap();
  assert_eq!(opt.current_epoch(), 0);
  assert_eq!(opt.remaining_epochs(), 20);
  assert!(opt.n_edges() > 0);

  opt.step_epochs(5).unwrap();
  assert_eq!(opt.current_epoch(), 5);
  assert_eq!(opt.remaining_epochs(), 15);

  opt.step_epochs(15).unwrap();
  assert_eq!(opt.remaining_epochs(), 0);

  assert!(matches!(
    opt.step_epochs(1),
    Err(UmapError::InvalidParameter(_))
  ));
  assert_eq!(opt.current_epoch(), 20);

  let fitted = opt.into_fitted(config);
  assert_eq!(fitted.embedding().dim(), (150, 2));
  assert!(fitted.reference_index().is_none());
}

#[test]
fn test_optimizer_rejects_bad_init() {
  let config = iris_config();
  let fitted = Umap::new(config.clone()).fit(fixtures::iris()).unwrap();

  let wrong_shape = Array2::<f32>::zeros((150, 3));
  assert!(matches!(
    Optimizer::new(fitted.manifold().clone(), wrong_shape, 10, &config),
    Err(UmapError::ShapeMismatch(_))
  ));

  let mut nan = fitted.embedding().to_owned();
  nan[(3, 1)] = f32::NAN;
  assert_eq!(
    Optimizer::new(fitted.manifold().clone(), nan, 10, &config).unwrap_err(),
    UmapError::NonFiniteValue { row: 3, column: 1 }
  );
}

#[test]
fn test_input_errors() {
  let data = fixtures::iris();

  let mut config = iris_config();
  config.graph.n_neighbors = 150;
  assert!(matches!(
    Umap::new(config).fit(data.clone()),
    Err(UmapError::InvalidParameter(_))
  ));

  let mut config = iris_config();
  config.metric = "no-such-metric".to_string();
  assert_eq!(
    Umap::new(config).fit(data.clone()).unwrap_err(),
    UmapError::UnknownMetric("no-such-metric".to_string())
  );

  let mut config = iris_config();
  config.metric = "haversine".to_string();
  assert!(matches!(
    Umap::new(config).fit(data.clone()),
    Err(UmapError::DimensionMismatch { expected: 2, found: 4 })
  ));

  assert_eq!(
    Umap::new(iris_config()).fit(Array2::<f32>::zeros((0, 4))).unwrap_err(),
    UmapError::EmptyDataset
  );

  let mut with_nan = data.clone();
  with_nan[(10, 2)] = f32::NAN;
  assert_eq!(
    Umap::new(iris_config()).fit(with_nan).unwrap_err(),
    UmapError::NonFiniteValue { row: 10, column: 2 }
  );

  let mut config = iris_config();
  config.neighbors.leaf_size = Some(0);
  assert!(matches!(
    Umap::new(config).fit(data.clone()),
    Err(UmapError::InvalidParameter(_))
  ));

  let mut config = iris_config();
  config.manifold.min_dist = 2.0;
  assert!(matches!(
    Umap::new(config).fit(data),
    Err(UmapError::InvalidParameter(_))
  ));
}

#[test]
fn test_transform_rejects_wrong_width() {
  let mut config = iris_config();
  config.optimization.n_epochs = Some(20);
  let umap = Umap::new(config);
  let fitted = umap.fit(fixtures::iris()).unwrap();
  assert_eq!(
    umap.transform(&fitted, Array2::<f32>::zeros((3, 5))).unwrap_err(),
    UmapError::DimensionMismatch {
      expected: 4,
      found: 5
    }
  );
}

#[test]
fn test_precomputed_knn_errors() {
  let umap = Umap::new(iris_config());
  let indices = Array2::<u32>::from_shape_fn((20, 10), |(i, j)| ((i + j) % 20) as u32);
  let dists = Array2::<f32>::from_shape_fn((20, 10), |(_, j)| j as f32);

  assert!(matches!(
    umap.learn_manifold(indices.view(), Array2::<f32>::zeros((20, 9)).view()),
    Err(UmapError::ShapeMismatch(_))
  ));

  let mut negative = dists.clone();
  negative[(4, 4)] = -1.0;
  assert!(matches!(
    umap.learn_manifold(indices.view(), negative.view()),
    Err(UmapError::InvalidParameter(_))
  ));

  let mut repeated = indices.clone();
  repeated[(2, 5)] = repeated[(2, 4)];
  assert!(matches!(
    umap.learn_manifold(repeated.view(), dists.view()),
    Err(UmapError::InvalidParameter(_))
  ));

  // Out of range indices mark missing neighbors.
  let mut missing = indices.clone();
  missing[(0, 9)] = u32::MAX;
  missing[(1, 9)] = u32::MAX;
  let manifold = umap.learn_manifold(missing.view(), dists.view()).unwrap();
  assert_eq!(manifold.n_vertices(), 20);
}
