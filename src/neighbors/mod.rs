//! Approximate nearest neighbor search: random projection forest, NN-descent
//! and the reference index used to place new points.

pub mod heap;
pub mod nn_descent;
pub mod rp_tree;

use crate::config::NeighborParams;
use crate::data::Dataset;
use crate::metric::Metric;
use heap::NeighborHeap;
use ndarray::Array2;
use ndarray::ArrayView2;
use nn_descent::NnDescent;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rp_tree::RpForest;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::info;
use typed_builder::TypedBuilder;

/// Output of the fit-time neighbor search.
pub struct KnnResult {
  pub indices: Array2<u32>,
  pub distances: Array2<f32>,
  pub forest: RpForest,
}

/// Build the approximate k-nearest neighbor graph of a dataset.
///
/// Column 0 of each output row is the point itself at distance 0; the
/// remaining columns are sorted by ascending distance.
#[derive(TypedBuilder)]
pub struct NearestNeighbors<'a> {
  data: &'a Dataset,
  metric: &'a dyn Metric,
  n_neighbors: usize,
  params: &'a NeighborParams,
}

impl<'a> NearestNeighbors<'a> {
  pub fn exec(self, rng: &mut StdRng) -> KnnResult {
    let NearestNeighbors {
      data,
      metric,
      n_neighbors,
      params,
    } = self;
    let n_samples = data.n_samples();

    let forest = RpForest::build(
      data,
      params.resolved_n_trees(n_samples),
      params.resolved_leaf_size(n_neighbors),
      metric.is_angular(),
      rng,
    );
    let (indices, distances) = NnDescent::builder()
      .data(data)
      .metric(metric)
      .forest(&forest)
      .n_neighbors(n_neighbors)
      .n_iters(params.resolved_n_iters(n_samples))
      .max_candidates(params.max_candidates)
      .delta(params.delta)
      .build()
      .exec(rng);

    KnnResult {
      indices,
      distances,
      forest,
    }
  }
}

/// Adjacency lists of the symmetrised kNN graph, in CSR layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchGraph {
  indptr: Vec<usize>,
  indices: Vec<u32>,
}

impl SearchGraph {
  /// Union of each point's kNN list and the points listing it as a neighbor,
  /// without self loops.
  pub fn from_knn(knn_indices: ArrayView2<u32>) -> Self {
    let n_samples = knn_indices.nrows();
    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); n_samples];
    for (i, row) in knn_indices.outer_iter().enumerate() {
      for &j in row.iter() {
        if j as usize == i || j as usize >= n_samples {
          continue;
        }
        adjacency[i].push(j);
        adjacency[j as usize].push(i as u32);
      }
    }
    let mut indptr = Vec::with_capacity(n_samples + 1);
    let mut indices = Vec::new();
    indptr.push(0);
    for mut list in adjacency {
      list.sort_unstable();
      list.dedup();
      indices.extend_from_slice(&list);
      indptr.push(indices.len());
    }
    Self { indptr, indices }
  }

  #[inline]
  pub fn neighbors(&self, i: usize) -> &[u32] {
    &self.indices[self.indptr[i]..self.indptr[i + 1]]
  }
}

/// The fitted dataset plus the structures needed to search it for new
/// points: the random projection forest and the symmetrised kNN graph.
///
/// Read-only after fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceIndex {
  data: Dataset,
  forest: RpForest,
  search_graph: SearchGraph,
}

impl ReferenceIndex {
  pub fn new(data: Dataset, forest: RpForest, knn_indices: ArrayView2<u32>) -> Self {
    let search_graph = SearchGraph::from_knn(knn_indices);
    Self {
      data,
      forest,
      search_graph,
    }
  }

  pub fn data(&self) -> &Dataset {
    &self.data
  }

  pub fn forest(&self) -> &RpForest {
    &self.forest
  }

  pub fn n_samples(&self) -> usize {
    self.data.n_samples()
  }

  /// Approximate `k` nearest reference points for every row of `queries`.
  ///
  /// Candidates come from the query's leaf in every tree, topped up with
  /// random reference points (then an index-order scan if the draws run
  /// out), then refined by best-first search over the kNN graph. Queries
  /// run in parallel with per-query seeds drawn from `seed` in order, so
  /// results do not depend on the thread count. Rows the metric cannot fill
  /// end in `u32::MAX` at infinite distance.
  pub fn query(
    &self,
    queries: &Dataset,
    metric: &dyn Metric,
    k: usize,
    seed: u64,
  ) -> (Array2<u32>, Array2<f32>) {
    let started = Instant::now();
    let n_queries = queries.n_samples();
    let n_reference = self.n_samples();
    assert!(k <= n_reference, "k must not exceed the reference size");

    let mut seeder = StdRng::seed_from_u64(seed);
    let seeds: Vec<u64> = (0..n_queries).map(|_| seeder.random()).collect();
    let heaps: Vec<NeighborHeap> = seeds
      .into_par_iter()
      .enumerate()
      .map(|(q, seed)| self.search_one(queries, q, metric, k, seed))
      .collect();

    let mut indices = Array2::<u32>::zeros((n_queries, k));
    let mut distances = Array2::<f32>::zeros((n_queries, k));
    for (q, heap) in heaps.iter().enumerate() {
      heap.write_row(indices.row_mut(q), distances.row_mut(q));
    }
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_queries, "reference query complete"
    );
    (indices, distances)
  }

  fn search_one(
    &self,
    queries: &Dataset,
    q: usize,
    metric: &dyn Metric,
    k: usize,
    seed: u64,
  ) -> NeighborHeap {
    let query = queries.row(q);
    let n_reference = self.n_samples();
    let mut heap = NeighborHeap::new(k);
    let mut visited: HashSet<u32> = HashSet::new();

    for leaf in self.forest.search(query) {
      for &candidate in leaf {
        if visited.insert(candidate) {
          let d = self.data.distance_to(metric, query, candidate as usize);
          heap.push(candidate, d, true);
        }
      }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..n_reference {
      if heap.len() >= k {
        break;
      }
      let candidate = rng.random_range(0..n_reference) as u32;
      if visited.insert(candidate) {
        let d = self.data.distance_to(metric, query, candidate as usize);
        heap.push(candidate, d, true);
      }
    }
    for candidate in 0..n_reference as u32 {
      if heap.len() >= k {
        break;
      }
      if visited.insert(candidate) {
        let d = self.data.distance_to(metric, query, candidate as usize);
        heap.push(candidate, d, true);
      }
    }

    while let Some(current) = heap.take_first_new() {
      for &candidate in self.search_graph.neighbors(current as usize) {
        if visited.insert(candidate) {
          let d = self.data.distance_to(metric, query, candidate as usize);
          if d < heap.worst() {
            heap.push(candidate, d, true);
          }
        }
      }
    }
    heap
  }
}
