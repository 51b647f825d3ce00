use std::cell::UnsafeCell;

/// A preallocated buffer that rayon workers fill in disjoint ranges.
///
/// Used to build CSR arrays row by row in parallel once the row offsets are
/// known: row `i` owns `[indptr[i]..indptr[i + 1]]`.
///
/// # Safety
///
/// Concurrent writers must touch disjoint indices.
pub struct ParallelVec<T> {
  data: UnsafeCell<Vec<T>>,
}

// SAFETY: callers only write disjoint indices concurrently.
unsafe impl<T: Send> Send for ParallelVec<T> {}
unsafe impl<T: Send> Sync for ParallelVec<T> {}

impl<T: Clone> ParallelVec<T> {
  pub fn filled(len: usize, value: T) -> Self {
    Self {
      data: UnsafeCell::new(vec![value; len]),
    }
  }
}

impl<T> ParallelVec<T> {
  /// Write a value at the given index.
  ///
  /// # Safety
  ///
  /// - Index must be in bounds
  /// - No other thread may be accessing the same index concurrently
  #[inline]
  pub unsafe fn write(&self, index: usize, value: T) {
    unsafe {
      let vec = &mut *self.data.get();
      debug_assert!(index < vec.len());
      *vec.get_unchecked_mut(index) = value;
    }
  }

  /// Mutable slice over `[start..start + len]`.
  ///
  /// # Safety
  ///
  /// - Range must be in bounds
  /// - No other thread may be accessing the same range concurrently
  #[inline]
  #[allow(clippy::mut_from_ref)]
  pub unsafe fn get_mut_slice(&self, start: usize, len: usize) -> &mut [T] {
    unsafe {
      let vec = &mut *self.data.get();
      debug_assert!(start + len <= vec.len());
      &mut vec[start..start + len]
    }
  }

  pub fn into_inner(self) -> Vec<T> {
    self.data.into_inner()
  }
}

/// Sort the entries of one CSR row by column index, carrying values along.
///
/// Insertion sort: rows hold at most a few hundred entries and arrive nearly
/// sorted.
pub fn sort_row(indices: &mut [u32], data: &mut [f32]) {
  for k in 1..indices.len() {
    let mut m = k;
    while m > 0 && indices[m - 1] > indices[m] {
      indices.swap(m - 1, m);
      data.swap(m - 1, m);
      m -= 1;
    }
  }
}
