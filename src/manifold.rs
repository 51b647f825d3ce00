use crate::umap::SparseMat;
use ndarray::Array1;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

/// The fuzzy topological structure learned from high-dimensional data.
///
/// Holds the symmetric fuzzy graph, the per-point calibration (sigma, rho)
/// and the fitted curve parameters of the low dimensional similarity
/// `1 / (1 + a d^(2b))`. It does not depend on the embedding dimension, so
/// one manifold can seed several embeddings or a resumed optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedManifold {
  /// graph[i, j] is the membership strength of edge i - j. Symmetric with
  /// no self loops.
  pub(crate) graph: SparseMat,

  /// Kernel width of each point's local metric.
  pub(crate) sigmas: Array1<f32>,

  /// Distance to each point's nearest (non-zero) neighbor.
  pub(crate) rhos: Array1<f32>,

  pub(crate) n_vertices: usize,

  pub(crate) a: f32,
  pub(crate) b: f32,
}

impl LearnedManifold {
  pub fn n_vertices(&self) -> usize {
    self.n_vertices
  }

  /// The curve parameters (a, b).
  pub fn curve_params(&self) -> (f32, f32) {
    (self.a, self.b)
  }

  pub fn graph(&self) -> &SparseMat {
    &self.graph
  }

  pub fn sigmas(&self) -> ArrayView1<'_, f32> {
    self.sigmas.view()
  }

  pub fn rhos(&self) -> ArrayView1<'_, f32> {
    self.rhos.view()
  }

  /// Vertices left without any edge, e.g. by `disconnection_distance`.
  pub fn disconnected_vertices(&self) -> Vec<usize> {
    self
      .graph
      .outer_iterator()
      .enumerate()
      .filter(|(_, row)| row.data().iter().all(|&w| w == 0.0))
      .map(|(i, _)| i)
      .collect()
  }
}
