use super::BinaryCounts;
use crate::data::SparseRow;

/// Merge two sparse rows, yielding `(x, y)` for every column in the union of
/// their indices. Missing entries are 0.
pub struct UnionIter<'a> {
  a: SparseRow<'a>,
  b: SparseRow<'a>,
  i: usize,
  j: usize,
}

impl<'a> UnionIter<'a> {
  pub fn new(a: SparseRow<'a>, b: SparseRow<'a>) -> Self {
    Self { a, b, i: 0, j: 0 }
  }
}

impl<'a> Iterator for UnionIter<'a> {
  type Item = (f32, f32);

  fn next(&mut self) -> Option<(f32, f32)> {
    let a_next = self.a.indices.get(self.i);
    let b_next = self.b.indices.get(self.j);
    match (a_next, b_next) {
      (Some(&ia), Some(&ib)) if ia == ib => {
        let item = (self.a.data[self.i], self.b.data[self.j]);
        self.i += 1;
        self.j += 1;
        Some(item)
      }
      (Some(&ia), Some(&ib)) if ia < ib => {
        let item = (self.a.data[self.i], 0.0);
        self.i += 1;
        Some(item)
      }
      (Some(_), Some(_)) | (None, Some(_)) => {
        let item = (0.0, self.b.data[self.j]);
        self.j += 1;
        Some(item)
      }
      (Some(_), None) => {
        let item = (self.a.data[self.i], 0.0);
        self.i += 1;
        Some(item)
      }
      (None, None) => None,
    }
  }
}

pub fn euclidean(x: SparseRow, y: SparseRow) -> f32 {
  UnionIter::new(x, y)
    .map(|(a, b)| {
      let diff = a - b;
      diff * diff
    })
    .sum::<f32>()
    .sqrt()
}

pub fn manhattan(x: SparseRow, y: SparseRow) -> f32 {
  UnionIter::new(x, y).map(|(a, b)| (a - b).abs()).sum()
}

pub fn chebyshev(x: SparseRow, y: SparseRow) -> f32 {
  UnionIter::new(x, y)
    .map(|(a, b)| (a - b).abs())
    .fold(0.0, f32::max)
}

pub fn minkowski(x: SparseRow, y: SparseRow, p: f32) -> f32 {
  let sum: f32 = UnionIter::new(x, y)
    .map(|(a, b)| (a - b).abs().powf(p))
    .sum();
  sum.powf(1.0 / p)
}

pub fn canberra(x: SparseRow, y: SparseRow) -> f32 {
  UnionIter::new(x, y)
    .map(|(a, b)| {
      let denom = a.abs() + b.abs();
      if denom > 0.0 {
        (a - b).abs() / denom
      } else {
        0.0
      }
    })
    .sum()
}

pub fn bray_curtis(x: SparseRow, y: SparseRow) -> f32 {
  let (num, denom) = UnionIter::new(x, y).fold((0.0f32, 0.0f32), |(n, d), (a, b)| {
    (n + (a - b).abs(), d + (a + b).abs())
  });
  if denom > 0.0 {
    num / denom
  } else {
    0.0
  }
}

pub fn cosine(x: SparseRow, y: SparseRow) -> f32 {
  let mut dot = 0.0f64;
  let mut norm_x = 0.0f64;
  let mut norm_y = 0.0f64;
  for (a, b) in UnionIter::new(x, y) {
    let (a, b) = (a as f64, b as f64);
    dot += a * b;
    norm_x += a * a;
    norm_y += b * b;
  }
  super::cosine_from_parts(dot, norm_x, norm_y)
}

/// Pearson correlation distance without densifying.
///
/// Columns outside the union contribute `(-mu_x) * (-mu_y)` each to the
/// centred dot product and `mu^2` each to the centred norms.
pub fn correlation(x: SparseRow, y: SparseRow, n_features: usize) -> f32 {
  let n = n_features as f64;
  let mu_x = x.data.iter().map(|&v| v as f64).sum::<f64>() / n;
  let mu_y = y.data.iter().map(|&v| v as f64).sum::<f64>() / n;
  let mut dot = 0.0f64;
  let mut norm_x = 0.0f64;
  let mut norm_y = 0.0f64;
  let mut union = 0usize;
  for (a, b) in UnionIter::new(x, y) {
    let a = a as f64 - mu_x;
    let b = b as f64 - mu_y;
    dot += a * b;
    norm_x += a * a;
    norm_y += b * b;
    union += 1;
  }
  let rest = (n_features - union) as f64;
  dot += rest * mu_x * mu_y;
  norm_x += rest * mu_x * mu_x;
  norm_y += rest * mu_y * mu_y;
  super::correlation_from_parts(dot, norm_x, norm_y)
}

pub fn hamming(x: SparseRow, y: SparseRow, n_features: usize) -> f32 {
  let differing = UnionIter::new(x, y).filter(|(a, b)| a != b).count();
  differing as f32 / n_features as f32
}

/// Count agreement of the nonzero patterns of two sparse rows.
///
/// Columns outside the union are zero in both rows and so count as
/// false-false.
pub fn binary_counts(x: SparseRow, y: SparseRow, n_features: usize) -> BinaryCounts {
  let mut counts = BinaryCounts {
    n: n_features,
    ..Default::default()
  };
  for (a, b) in UnionIter::new(x, y) {
    counts.add(a != 0.0, b != 0.0);
  }
  counts
}
