use crate::error::Result;
use crate::error::UmapError;
use crate::metric::Metric;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use sprs::CsMat;

/// Compressed sparse row storage for sparse input data.
///
/// Column indices within each row are unique and ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseData {
  n_features: usize,
  indptr: Vec<usize>,
  indices: Vec<usize>,
  data: Vec<f32>,
}

impl SparseData {
  /// Build from raw CSR arrays, validating structure.
  pub fn new(
    n_features: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f32>,
  ) -> Result<Self> {
    if indptr.is_empty() || indptr[0] != 0 {
      return Err(UmapError::ShapeMismatch(
        "indptr must start with 0".to_string(),
      ));
    }
    if indices.len() != data.len() || *indptr.last().unwrap_or(&0) != indices.len() {
      return Err(UmapError::ShapeMismatch(format!(
        "indptr ends at {} but there are {} indices and {} values",
        indptr.last().copied().unwrap_or(0),
        indices.len(),
        data.len()
      )));
    }
    for (row, bounds) in indptr.windows(2).enumerate() {
      if bounds[1] < bounds[0] {
        return Err(UmapError::ShapeMismatch(format!(
          "indptr decreases at row {row}"
        )));
      }
      let row_indices = &indices[bounds[0]..bounds[1]];
      for (pos, &col) in row_indices.iter().enumerate() {
        if col >= n_features {
          return Err(UmapError::DimensionMismatch {
            expected: n_features,
            found: col + 1,
          });
        }
        if pos > 0 && row_indices[pos - 1] >= col {
          return Err(UmapError::ShapeMismatch(format!(
            "column indices of row {row} are not strictly ascending"
          )));
        }
      }
    }
    Ok(Self {
      n_features,
      indptr,
      indices,
      data,
    })
  }

  pub fn n_rows(&self) -> usize {
    self.indptr.len() - 1
  }

  pub fn n_features(&self) -> usize {
    self.n_features
  }

  pub fn nnz(&self) -> usize {
    self.data.len()
  }

  pub fn row(&self, i: usize) -> SparseRow<'_> {
    let start = self.indptr[i];
    let end = self.indptr[i + 1];
    SparseRow {
      indices: &self.indices[start..end],
      data: &self.data[start..end],
    }
  }

  pub fn to_dense(&self) -> Array2<f32> {
    let mut dense = Array2::<f32>::zeros((self.n_rows(), self.n_features));
    for i in 0..self.n_rows() {
      let row = self.row(i);
      for (&col, &val) in row.indices.iter().zip(row.data) {
        dense[(i, col)] = val;
      }
    }
    dense
  }
}

impl From<CsMat<f32>> for SparseData {
  fn from(matrix: CsMat<f32>) -> Self {
    let csr = if matrix.is_csr() {
      matrix
    } else {
      matrix.to_csr()
    };
    let mut indptr = Vec::with_capacity(csr.rows() + 1);
    let mut indices = Vec::with_capacity(csr.nnz());
    let mut data = Vec::with_capacity(csr.nnz());
    indptr.push(0);
    for row in csr.outer_iterator() {
      for (col, &val) in row.iter() {
        indices.push(col);
        data.push(val);
      }
      indptr.push(indices.len());
    }
    Self {
      n_features: csr.cols(),
      indptr,
      indices,
      data,
    }
  }
}

/// A borrowed sparse row: parallel index and value slices.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
  pub indices: &'a [usize],
  pub data: &'a [f32],
}

impl<'a> SparseRow<'a> {
  pub fn to_dense(&self, n_features: usize) -> Array1<f32> {
    let mut dense = Array1::<f32>::zeros(n_features);
    for (&col, &val) in self.indices.iter().zip(self.data) {
      dense[col] = val;
    }
    dense
  }
}

/// A borrowed row of a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub enum Row<'a> {
  Dense(ArrayView1<'a, f32>),
  Sparse(SparseRow<'a>),
}

/// Input data for fitting or transforming.
///
/// Dense data is an `(n_samples, n_features)` array; sparse data is CSR.
/// Either form is treated as immutable once handed to the algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Dataset {
  Dense(Array2<f32>),
  Sparse(SparseData),
}

impl From<Array2<f32>> for Dataset {
  fn from(data: Array2<f32>) -> Self {
    Dataset::Dense(data)
  }
}

impl From<SparseData> for Dataset {
  fn from(data: SparseData) -> Self {
    Dataset::Sparse(data)
  }
}

impl From<CsMat<f32>> for Dataset {
  fn from(data: CsMat<f32>) -> Self {
    Dataset::Sparse(SparseData::from(data))
  }
}

impl Dataset {
  pub fn n_samples(&self) -> usize {
    match self {
      Dataset::Dense(d) => d.nrows(),
      Dataset::Sparse(s) => s.n_rows(),
    }
  }

  pub fn n_features(&self) -> usize {
    match self {
      Dataset::Dense(d) => d.ncols(),
      Dataset::Sparse(s) => s.n_features(),
    }
  }

  pub fn is_sparse(&self) -> bool {
    matches!(self, Dataset::Sparse(_))
  }

  pub fn row(&self, i: usize) -> Row<'_> {
    match self {
      Dataset::Dense(d) => Row::Dense(d.row(i)),
      Dataset::Sparse(s) => Row::Sparse(s.row(i)),
    }
  }

  /// Reject empty data and NaN/infinite entries.
  pub fn validate(&self) -> Result<()> {
    if self.n_samples() == 0 || self.n_features() == 0 {
      return Err(UmapError::EmptyDataset);
    }
    match self {
      Dataset::Dense(d) => {
        for ((row, column), v) in d.indexed_iter() {
          if !v.is_finite() {
            return Err(UmapError::NonFiniteValue { row, column });
          }
        }
      }
      Dataset::Sparse(s) => {
        for row in 0..s.n_rows() {
          let r = s.row(row);
          if let Some(pos) = r.data.iter().position(|v| !v.is_finite()) {
            return Err(UmapError::NonFiniteValue {
              row,
              column: r.indices[pos],
            });
          }
        }
      }
    }
    Ok(())
  }

  /// Distance between two rows of this dataset.
  #[inline]
  pub(crate) fn distance(&self, metric: &dyn Metric, i: usize, j: usize) -> f32 {
    row_distance(metric, self.row(i), self.row(j), self.n_features())
  }

  /// Distance between an external row and row `j` of this dataset.
  #[inline]
  pub(crate) fn distance_to(&self, metric: &dyn Metric, query: Row, j: usize) -> f32 {
    row_distance(metric, query, self.row(j), self.n_features())
  }
}

/// Evaluate `metric` on two rows of any storage kind.
///
/// Mixed dense/sparse pairs densify the sparse side.
pub fn row_distance(metric: &dyn Metric, a: Row, b: Row, n_features: usize) -> f32 {
  match (a, b) {
    (Row::Dense(x), Row::Dense(y)) => metric.distance(x, y),
    (Row::Sparse(x), Row::Sparse(y)) => metric.sparse_distance(x, y, n_features),
    (Row::Dense(x), Row::Sparse(y)) => metric.distance(x, y.to_dense(n_features).view()),
    (Row::Sparse(x), Row::Dense(y)) => metric.distance(x.to_dense(n_features).view(), y),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;
  use sprs::TriMat;

  #[test]
  fn test_validate_rejects_nan() {
    let data = Dataset::from(array![[1.0, 2.0], [f32::NAN, 0.0]]);
    assert_eq!(
      data.validate(),
      Err(UmapError::NonFiniteValue { row: 1, column: 0 })
    );
  }

  #[test]
  fn test_validate_rejects_empty() {
    let data = Dataset::from(Array2::<f32>::zeros((0, 3)));
    assert_eq!(data.validate(), Err(UmapError::EmptyDataset));
  }

  #[test]
  fn test_sparse_from_csmat_matches_dense() {
    let mut tri = TriMat::new((3, 4));
    tri.add_triplet(0, 1, 2.0f32);
    tri.add_triplet(2, 3, -1.0);
    tri.add_triplet(2, 0, 0.5);
    let sparse = SparseData::from(tri.to_csr::<usize>());
    assert_eq!(sparse.nnz(), 3);
    let dense = sparse.to_dense();
    assert_eq!(dense, array![[0.0, 2.0, 0.0, 0.0], [0.0; 4], [0.5, 0.0, 0.0, -1.0]]);
    assert_eq!(sparse.row(1).indices.len(), 0);
  }

  #[test]
  fn test_sparse_new_rejects_unsorted_indices() {
    let result = SparseData::new(4, vec![0, 2], vec![3, 1], vec![1.0, 1.0]);
    assert!(matches!(result, Err(UmapError::ShapeMismatch(_))));
  }
}
