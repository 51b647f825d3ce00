use thiserror::Error;

/// Errors surfaced by the public UMAP entry points.
///
/// Only input problems are reported this way. Numerical edge cases (duplicate
/// points, disconnected graphs, degenerate hyperplanes, slow eigensolves) are
/// handled internally and never produce an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UmapError {
  #[error("dataset is empty")]
  EmptyDataset,

  #[error("dimension mismatch: expected {expected} features, found {found}")]
  DimensionMismatch { expected: usize, found: usize },

  #[error("non-finite value at row {row}, column {column}")]
  NonFiniteValue { row: usize, column: usize },

  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  #[error("unknown metric: {0}")]
  UnknownMetric(String),

  #[error("shape mismatch: {0}")]
  ShapeMismatch(String),

  #[error("model has no reference index; fit it on raw data before calling transform")]
  NotFitted,
}

pub type Result<T> = std::result::Result<T, UmapError>;
