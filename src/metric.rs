use crate::data::SparseRow;
use ndarray::ArrayView1;
use std::fmt::Debug;

/// A distance function on the input space.
///
/// Used for neighbor search and graph construction. Implementations must be
/// symmetric, non-negative and return 0 for identical rows. Thread-safety
/// (Send + Sync) is required because distances are evaluated from rayon
/// workers.
pub trait Metric: Debug + Send + Sync {
  /// Distance between two dense rows of equal length.
  fn distance(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32;

  /// Distance between two sparse rows of a dataset with `n_features` columns.
  ///
  /// Default: densify both rows and call [`Metric::distance`].
  fn sparse_distance(&self, a: SparseRow, b: SparseRow, n_features: usize) -> f32 {
    let a = a.to_dense(n_features);
    let b = b.to_dense(n_features);
    self.distance(a.view(), b.view())
  }

  /// Whether random projection trees should split by angle rather than by
  /// position.
  ///
  /// Default: false
  fn is_angular(&self) -> bool {
    false
  }

  /// Distance at or beyond which two points are treated as unrelated.
  ///
  /// Bounded metrics return their maximum value so that maximally distant
  /// neighbors do not become graph edges.
  ///
  /// Default: f32::INFINITY
  fn disconnection_threshold(&self) -> f32 {
    f32::INFINITY
  }
}
