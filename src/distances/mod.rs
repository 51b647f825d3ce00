//! Named input-space metrics with dense and sparse implementations.

pub mod dense;
pub mod sparse;

use crate::data::SparseRow;
use crate::error::Result;
use crate::error::UmapError;
use crate::metric::Metric;
use ndarray::Array2;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

/// Agreement counts between the nonzero patterns of two rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCounts {
  pub n: usize,
  pub ntt: usize,
  pub ntf: usize,
  pub nft: usize,
}

impl BinaryCounts {
  #[inline(always)]
  pub fn add(&mut self, x: bool, y: bool) {
    match (x, y) {
      (true, true) => self.ntt += 1,
      (true, false) => self.ntf += 1,
      (false, true) => self.nft += 1,
      (false, false) => {}
    }
  }

  #[inline(always)]
  fn not_equal(&self) -> f32 {
    (self.ntf + self.nft) as f32
  }

  pub fn jaccard(&self) -> f32 {
    let non_zero = self.ntt as f32 + self.not_equal();
    if non_zero == 0.0 {
      0.0
    } else {
      self.not_equal() / non_zero
    }
  }

  pub fn matching(&self) -> f32 {
    self.not_equal() / self.n as f32
  }

  pub fn dice(&self) -> f32 {
    let nne = self.not_equal();
    if nne == 0.0 {
      0.0
    } else {
      nne / (2.0 * self.ntt as f32 + nne)
    }
  }

  pub fn kulsinski(&self) -> f32 {
    let nne = self.not_equal();
    let n = self.n as f32;
    if nne == 0.0 {
      0.0
    } else {
      (nne - self.ntt as f32 + n) / (nne + n)
    }
  }

  pub fn rogers_tanimoto(&self) -> f32 {
    let nne = self.not_equal();
    (2.0 * nne) / (self.n as f32 + nne)
  }

  pub fn russell_rao(&self) -> f32 {
    if self.ntf == 0 && self.nft == 0 {
      0.0
    } else {
      (self.n - self.ntt) as f32 / self.n as f32
    }
  }

  pub fn sokal_michener(&self) -> f32 {
    self.rogers_tanimoto()
  }

  pub fn sokal_sneath(&self) -> f32 {
    let nne = self.not_equal();
    if nne == 0.0 {
      0.0
    } else {
      nne / (0.5 * self.ntt as f32 + nne)
    }
  }

  pub fn yule(&self) -> f32 {
    if self.ntf == 0 || self.nft == 0 {
      return 0.0;
    }
    let nff = (self.n - self.ntt - self.ntf - self.nft) as f64;
    let tf_ft = self.ntf as f64 * self.nft as f64;
    ((2.0 * tf_ft) / (self.ntt as f64 * nff + tf_ft)) as f32
  }
}

fn cosine_from_parts(dot: f64, norm_x: f64, norm_y: f64) -> f32 {
  if norm_x == 0.0 && norm_y == 0.0 {
    0.0
  } else if norm_x == 0.0 || norm_y == 0.0 {
    1.0
  } else {
    (1.0 - dot / (norm_x * norm_y).sqrt()).max(0.0) as f32
  }
}

fn correlation_from_parts(dot: f64, norm_x: f64, norm_y: f64) -> f32 {
  if norm_x == 0.0 && norm_y == 0.0 {
    0.0
  } else if dot == 0.0 {
    1.0
  } else {
    (1.0 - dot / (norm_x * norm_y).sqrt()).max(0.0) as f32
  }
}

/// The built-in input-space metrics.
///
/// Binary metrics treat any nonzero value as true. Haversine expects
/// two-column (latitude, longitude) data in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NamedMetric {
  Euclidean,
  Manhattan,
  Chebyshev,
  Minkowski { p: f32 },
  Canberra,
  BrayCurtis,
  Cosine,
  Correlation,
  Haversine,
  Hamming,
  Jaccard,
  Matching,
  Dice,
  Kulsinski,
  RogersTanimoto,
  RussellRao,
  SokalMichener,
  SokalSneath,
  Yule,
  StandardisedEuclidean { variances: Vec<f32> },
  WeightedMinkowski { weights: Vec<f32>, p: f32 },
  Mahalanobis { inverse_covariance: Array2<f32> },
}

impl NamedMetric {
  /// Resolve a metric by name.
  ///
  /// Parametric metrics (`seuclidean`, `wminkowski`, `mahalanobis`) cannot be
  /// built from a name alone; construct the variant and pass it to
  /// `Umap::with_metric` instead.
  pub fn from_name(name: &str) -> Result<Self> {
    let metric = match name.to_ascii_lowercase().as_str() {
      "euclidean" | "l2" => NamedMetric::Euclidean,
      "manhattan" | "l1" | "taxicab" => NamedMetric::Manhattan,
      "chebyshev" | "linf" | "linfinity" | "linfty" => NamedMetric::Chebyshev,
      "minkowski" => NamedMetric::Minkowski { p: 2.0 },
      "canberra" => NamedMetric::Canberra,
      "braycurtis" => NamedMetric::BrayCurtis,
      "cosine" => NamedMetric::Cosine,
      "correlation" => NamedMetric::Correlation,
      "haversine" => NamedMetric::Haversine,
      "hamming" => NamedMetric::Hamming,
      "jaccard" => NamedMetric::Jaccard,
      "matching" => NamedMetric::Matching,
      "dice" => NamedMetric::Dice,
      "kulsinski" => NamedMetric::Kulsinski,
      "rogerstanimoto" => NamedMetric::RogersTanimoto,
      "russellrao" => NamedMetric::RussellRao,
      "sokalmichener" => NamedMetric::SokalMichener,
      "sokalsneath" => NamedMetric::SokalSneath,
      "yule" => NamedMetric::Yule,
      "seuclidean" | "wminkowski" | "mahalanobis" => {
        return Err(UmapError::InvalidParameter(format!(
          "metric '{name}' needs parameters; construct NamedMetric directly"
        )))
      }
      _ => return Err(UmapError::UnknownMetric(name.to_string())),
    };
    Ok(metric)
  }

  /// Check that this metric can be evaluated on rows with `n_features`
  /// columns.
  pub fn check_dimension(&self, n_features: usize) -> Result<()> {
    let mismatch = |expected: usize| -> Result<()> {
      Err(UmapError::DimensionMismatch {
        expected,
        found: n_features,
      })
    };
    match self {
      NamedMetric::Haversine if n_features != 2 => mismatch(2),
      NamedMetric::StandardisedEuclidean { variances } if variances.len() != n_features => {
        mismatch(variances.len())
      }
      NamedMetric::WeightedMinkowski { weights, .. } if weights.len() != n_features => {
        mismatch(weights.len())
      }
      NamedMetric::Mahalanobis { inverse_covariance }
        if inverse_covariance.dim() != (n_features, n_features) =>
      {
        Err(UmapError::ShapeMismatch(format!(
          "inverse covariance is {:?}, expected ({n_features}, {n_features})",
          inverse_covariance.dim()
        )))
      }
      NamedMetric::Minkowski { p } | NamedMetric::WeightedMinkowski { p, .. } if !(*p > 0.0) => Err(
        UmapError::InvalidParameter(format!("minkowski p must be > 0, got {p}")),
      ),
      _ => Ok(()),
    }
  }
}

impl Metric for NamedMetric {
  fn distance(&self, a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    match self {
      NamedMetric::Euclidean => dense::euclidean(a, b),
      NamedMetric::Manhattan => dense::manhattan(a, b),
      NamedMetric::Chebyshev => dense::chebyshev(a, b),
      NamedMetric::Minkowski { p } => dense::minkowski(a, b, *p),
      NamedMetric::Canberra => dense::canberra(a, b),
      NamedMetric::BrayCurtis => dense::bray_curtis(a, b),
      NamedMetric::Cosine => dense::cosine(a, b),
      NamedMetric::Correlation => dense::correlation(a, b),
      NamedMetric::Haversine => dense::haversine(a, b),
      NamedMetric::Hamming => dense::hamming(a, b),
      NamedMetric::Jaccard => dense::binary_counts(a, b).jaccard(),
      NamedMetric::Matching => dense::binary_counts(a, b).matching(),
      NamedMetric::Dice => dense::binary_counts(a, b).dice(),
      NamedMetric::Kulsinski => dense::binary_counts(a, b).kulsinski(),
      NamedMetric::RogersTanimoto => dense::binary_counts(a, b).rogers_tanimoto(),
      NamedMetric::RussellRao => dense::binary_counts(a, b).russell_rao(),
      NamedMetric::SokalMichener => dense::binary_counts(a, b).sokal_michener(),
      NamedMetric::SokalSneath => dense::binary_counts(a, b).sokal_sneath(),
      NamedMetric::Yule => dense::binary_counts(a, b).yule(),
      NamedMetric::StandardisedEuclidean { variances } => {
        dense::standardised_euclidean(a, b, variances)
      }
      NamedMetric::WeightedMinkowski { weights, p } => {
        dense::weighted_minkowski(a, b, weights, *p)
      }
      NamedMetric::Mahalanobis { inverse_covariance } => {
        dense::mahalanobis(a, b, inverse_covariance)
      }
    }
  }

  fn sparse_distance(&self, a: SparseRow, b: SparseRow, n_features: usize) -> f32 {
    match self {
      NamedMetric::Euclidean => sparse::euclidean(a, b),
      NamedMetric::Manhattan => sparse::manhattan(a, b),
      NamedMetric::Chebyshev => sparse::chebyshev(a, b),
      NamedMetric::Minkowski { p } => sparse::minkowski(a, b, *p),
      NamedMetric::Canberra => sparse::canberra(a, b),
      NamedMetric::BrayCurtis => sparse::bray_curtis(a, b),
      NamedMetric::Cosine => sparse::cosine(a, b),
      NamedMetric::Correlation => sparse::correlation(a, b, n_features),
      NamedMetric::Hamming => sparse::hamming(a, b, n_features),
      NamedMetric::Jaccard => sparse::binary_counts(a, b, n_features).jaccard(),
      NamedMetric::Matching => sparse::binary_counts(a, b, n_features).matching(),
      NamedMetric::Dice => sparse::binary_counts(a, b, n_features).dice(),
      NamedMetric::Kulsinski => sparse::binary_counts(a, b, n_features).kulsinski(),
      NamedMetric::RogersTanimoto => sparse::binary_counts(a, b, n_features).rogers_tanimoto(),
      NamedMetric::RussellRao => sparse::binary_counts(a, b, n_features).russell_rao(),
      NamedMetric::SokalMichener => sparse::binary_counts(a, b, n_features).sokal_michener(),
      NamedMetric::SokalSneath => sparse::binary_counts(a, b, n_features).sokal_sneath(),
      NamedMetric::Yule => sparse::binary_counts(a, b, n_features).yule(),
      NamedMetric::Haversine
      | NamedMetric::StandardisedEuclidean { .. }
      | NamedMetric::WeightedMinkowski { .. }
      | NamedMetric::Mahalanobis { .. } => {
        let a = a.to_dense(n_features);
        let b = b.to_dense(n_features);
        self.distance(a.view(), b.view())
      }
    }
  }

  fn is_angular(&self) -> bool {
    matches!(self, NamedMetric::Cosine | NamedMetric::Correlation)
  }

  fn disconnection_threshold(&self) -> f32 {
    match self {
      NamedMetric::Cosine | NamedMetric::Correlation => 2.0,
      NamedMetric::Jaccard | NamedMetric::Dice => 1.0,
      _ => f32::INFINITY,
    }
  }
}
