use ndarray::ArrayViewMut1;

/// One entry of a candidate neighbor list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
  pub index: u32,
  pub distance: f32,
  /// Not yet used as a source of candidates (NN-descent) or not yet expanded
  /// (graph search).
  pub is_new: bool,
}

/// A bounded neighbor list kept sorted by ascending distance.
///
/// Holds at most `capacity` entries with unique indices. Entries with equal
/// distance keep insertion order, so a newcomer lands after any existing
/// entry at the same distance.
#[derive(Debug, Clone)]
pub struct NeighborHeap {
  capacity: usize,
  entries: Vec<Neighbor>,
}

impl NeighborHeap {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      entries: Vec::with_capacity(capacity + 1),
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.entries.len() >= self.capacity
  }

  /// Distance a candidate must beat to be accepted.
  #[inline]
  pub fn worst(&self) -> f32 {
    if self.is_full() {
      self.entries[self.entries.len() - 1].distance
    } else {
      f32::INFINITY
    }
  }

  #[inline]
  pub fn entries(&self) -> &[Neighbor] {
    &self.entries
  }

  #[inline]
  pub fn contains(&self, index: u32) -> bool {
    self.entries.iter().any(|e| e.index == index)
  }

  /// Insert a candidate. Returns true if the list changed.
  ///
  /// When full, a candidate is accepted only if strictly closer than the
  /// current worst entry, which is then evicted.
  pub fn push(&mut self, index: u32, distance: f32, is_new: bool) -> bool {
    if distance.is_nan() || (self.is_full() && distance >= self.worst()) {
      return false;
    }
    if self.contains(index) {
      return false;
    }
    let pos = self.entries.partition_point(|e| e.distance <= distance);
    self.entries.insert(
      pos,
      Neighbor {
        index,
        distance,
        is_new,
      },
    );
    self.entries.truncate(self.capacity);
    true
  }

  /// Clear the `is_new` flag on every entry whose index satisfies `pred`.
  pub fn mark_old_where(&mut self, pred: impl Fn(u32) -> bool) {
    for e in self.entries.iter_mut() {
      if e.is_new && pred(e.index) {
        e.is_new = false;
      }
    }
  }

  /// Return the closest entry not yet expanded and mark it expanded.
  pub fn take_first_new(&mut self) -> Option<u32> {
    let e = self.entries.iter_mut().find(|e| e.is_new)?;
    e.is_new = false;
    Some(e.index)
  }

  /// Whether `index` is listed and still flagged new.
  #[inline]
  pub fn contains_new(&self, index: u32) -> bool {
    self.entries.iter().any(|e| e.index == index && e.is_new)
  }

  /// Copy the list into output rows. Slots past the end of a short list get
  /// index `u32::MAX` at infinite distance.
  pub fn write_row(&self, mut indices: ArrayViewMut1<u32>, mut distances: ArrayViewMut1<f32>) {
    for col in 0..indices.len() {
      match self.entries.get(col) {
        Some(e) => {
          indices[col] = e.index;
          distances[col] = e.distance;
        }
        None => {
          indices[col] = u32::MAX;
          distances[col] = f32::INFINITY;
        }
      }
    }
  }
}
