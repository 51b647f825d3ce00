use super::compute_membership_strengths::membership_strength;
use super::smooth_knn_dist::SmoothKnnDist;
use crate::utils::parallel_vec::sort_row;
use crate::utils::parallel_vec::ParallelVec;
use dashmap::DashSet;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use rayon::prelude::*;
use sprs::CsMatI;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::info;
use typed_builder::TypedBuilder;

/// Sparse matrix with u32 indices to save memory (4 bytes vs 8 bytes per index).
/// Valid for n_samples < 2^32.
pub type SparseMat = CsMatI<f32, u32>;

/// CSC structure without data, for transpose traversal. Values are looked up
/// in the CSR by binary search.
struct CscStructure {
  indptr: Vec<u32>,
  indices: Vec<u32>,
}

impl CscStructure {
  #[inline]
  fn col_row_indices(&self, col: usize) -> &[u32] {
    let start = self.indptr[col] as usize;
    let end = self.indptr[col + 1] as usize;
    &self.indices[start..end]
  }
}

/// Prefix sum of row counts into a CSR index pointer.
fn prefix_sum(counts: impl IntoIterator<Item = u32>, len: usize) -> Vec<u32> {
  let mut indptr: Vec<u32> = Vec::with_capacity(len + 1);
  indptr.push(0);
  let mut total = 0u64;
  for count in counts {
    total += count as u64;
    assert!(total < u32::MAX as u64, "graph nnz overflows u32");
    indptr.push(total as u32);
  }
  indptr
}

/*
  Fuse per-point neighbor sets into one weighted undirected graph.

  Each point's kNN distances are calibrated (rho, sigma), turned into
  directed membership strengths w(i -> j) = exp(-max(0, d - rho_i) / sigma_i),
  optionally raised to `membership_exponent`, and then combined with their
  transpose:

    mix * (A + A^T) + (1 - 2 * mix) * (A . A^T)

  With mix = 1 this is the probabilistic OR a + b - ab; with mix = 0 it is
  the product. The result is exactly symmetric.

  Returns (graph, sigmas, rhos).
*/
#[derive(TypedBuilder, Debug)]
pub struct FuzzySimplicialSet<'i, 'k, 'd> {
  n_samples: usize,
  n_neighbors: usize,
  knn_indices: ArrayView2<'i, u32>,
  knn_dists: ArrayView2<'k, f32>,
  knn_disconnections: &'d DashSet<(usize, usize)>,
  #[builder(default = 1.0)]
  set_op_mix_ratio: f32,
  #[builder(default = 1.0)]
  local_connectivity: f32,
  #[builder(default = 1.0)]
  bandwidth: f32,
  #[builder(default = 1.0)]
  membership_exponent: f32,
  #[builder(default = true)]
  apply_set_operations: bool,
}

impl<'i, 'k, 'd> FuzzySimplicialSet<'i, 'k, 'd> {
  pub fn exec(self) -> (SparseMat, Array1<f32>, Array1<f32>) {
    let FuzzySimplicialSet {
      n_samples,
      n_neighbors,
      knn_indices,
      knn_dists,
      knn_disconnections,
      set_op_mix_ratio,
      local_connectivity,
      bandwidth,
      membership_exponent,
      apply_set_operations,
    } = self;
    assert!(
      n_samples < u32::MAX as usize,
      "n_samples must be < 2^32 for u32 indices"
    );

    let started = Instant::now();
    let (sigmas, rhos) = SmoothKnnDist::builder()
      .distances(knn_dists)
      .k(n_neighbors)
      .local_connectivity(local_connectivity)
      .bandwidth(bandwidth)
      .build()
      .exec();
    info!(
      duration_ms = started.elapsed().as_millis(),
      "smooth_knn_dist complete"
    );

    let started = Instant::now();
    let mut graph = build_membership_csr(
      n_samples,
      knn_indices,
      knn_dists,
      knn_disconnections,
      sigmas.view(),
      rhos.view(),
      membership_exponent,
    );
    info!(
      duration_ms = started.elapsed().as_millis(),
      nnz = graph.nnz(),
      "build_membership_csr complete"
    );

    if apply_set_operations {
      let started = Instant::now();
      graph = apply_set_operations_parallel(&graph, set_op_mix_ratio);
      info!(
        duration_ms = started.elapsed().as_millis(),
        nnz = graph.nnz(),
        "set_operations complete"
      );
    }

    (graph, sigmas, rhos)
  }
}

/// Directed membership graph as CSR, built row-parallel without
/// intermediate COO storage.
fn build_membership_csr(
  n_samples: usize,
  knn_indices: ArrayView2<u32>,
  knn_dists: ArrayView2<f32>,
  knn_disconnections: &DashSet<(usize, usize)>,
  sigmas: ArrayView1<f32>,
  rhos: ArrayView1<f32>,
  exponent: f32,
) -> SparseMat {
  let n_neighbors = knn_indices.ncols();
  let edge = |i: usize, j: usize| -> Option<(u32, f32)> {
    if knn_disconnections.contains(&(i, j)) {
      return None;
    }
    let knn_idx = knn_indices[(i, j)];
    // Self loops and sentinel indices.
    if knn_idx as usize == i || knn_idx as usize >= n_samples {
      return None;
    }
    let val = membership_strength(knn_dists[(i, j)], rhos[i], sigmas[i], exponent);
    (val != 0.0).then_some((knn_idx, val))
  };

  let row_counts: Vec<u32> = (0..n_samples)
    .into_par_iter()
    .map(|i| (0..n_neighbors).filter(|&j| edge(i, j).is_some()).count() as u32)
    .collect();
  let indptr = prefix_sum(row_counts, n_samples);
  let nnz = indptr[n_samples] as usize;

  let indices_vec = ParallelVec::filled(nnz, 0u32);
  let data_vec = ParallelVec::filled(nnz, 0.0f32);
  (0..n_samples).into_par_iter().for_each(|i| {
    let row_start = indptr[i] as usize;
    let mut offset = 0;
    for j in 0..n_neighbors {
      if let Some((col, val)) = edge(i, j) {
        // SAFETY: row i writes only to [indptr[i]..indptr[i + 1]].
        unsafe {
          indices_vec.write(row_start + offset, col);
          data_vec.write(row_start + offset, val);
        }
        offset += 1;
      }
    }
    let row_len = (indptr[i + 1] - indptr[i]) as usize;
    if row_len > 1 {
      // SAFETY: as above.
      let (row_indices, row_data) = unsafe {
        (
          indices_vec.get_mut_slice(row_start, row_len),
          data_vec.get_mut_slice(row_start, row_len),
        )
      };
      sort_row(row_indices, row_data);
    }
  });

  CsMatI::new(
    (n_samples, n_samples),
    indptr,
    indices_vec.into_inner(),
    data_vec.into_inner(),
  )
}

fn build_csc_structure(csr: &SparseMat) -> CscStructure {
  let (n_rows, n_cols) = csr.shape();

  let col_counts: Vec<AtomicU32> = (0..n_cols).map(|_| AtomicU32::new(0)).collect();
  (0..n_rows).into_par_iter().for_each(|row| {
    for &col in row_indices(csr, row) {
      col_counts[col as usize].fetch_add(1, Ordering::Relaxed);
    }
  });
  let indptr = prefix_sum(col_counts.iter().map(|c| c.load(Ordering::Relaxed)), n_cols);

  // Rows are visited in order, so each column's row list comes out sorted.
  let mut indices: Vec<u32> = vec![0; csr.nnz()];
  let mut col_offsets: Vec<u32> = vec![0; n_cols];
  for row in 0..n_rows {
    for &col in row_indices(csr, row) {
      let write_pos = (indptr[col as usize] + col_offsets[col as usize]) as usize;
      indices[write_pos] = row as u32;
      col_offsets[col as usize] += 1;
    }
  }

  CscStructure { indptr, indices }
}

#[inline]
fn row_range(csr: &SparseMat, row: usize) -> std::ops::Range<usize> {
  csr.indptr().index(row) as usize..csr.indptr().index(row + 1) as usize
}

#[inline]
fn row_indices(csr: &SparseMat, row: usize) -> &[u32] {
  &csr.indices()[row_range(csr, row)]
}

/// A[row, col], or 0 when absent.
#[inline]
fn csr_get(csr: &SparseMat, row: usize, col: u32) -> f32 {
  let range = row_range(csr, row);
  let row_indices = &csr.indices()[range.clone()];
  match row_indices.binary_search(&col) {
    Ok(idx) => csr.data()[range.start + idx],
    Err(_) => 0.0,
  }
}

/// Combined strength of an edge seen as `a` from one side and `b` from the
/// other. Both orientations evaluate to the same bits.
#[inline(always)]
fn combine(a: f32, b: f32, mix: f32, prod_coeff: f32) -> f32 {
  (mix * a + mix * b) + prod_coeff * (a * b)
}

/// Emit the symmetrised entries of `row`: A's row plus entries of column
/// `row` with no direct counterpart.
fn for_each_union_entry(
  input: &SparseMat,
  csc: &CscStructure,
  row: usize,
  mix: f32,
  prod_coeff: f32,
  mut emit: impl FnMut(u32, f32),
) {
  let range = row_range(input, row);
  let indices = &input.indices()[range.clone()];
  let data = &input.data()[range];
  for (&col, &val_rc) in indices.iter().zip(data) {
    let val_cr = csr_get(input, col as usize, row as u32);
    let val = combine(val_rc, val_cr, mix, prod_coeff);
    if val != 0.0 {
      emit(col, val);
    }
  }
  for &c in csc.col_row_indices(row) {
    if csr_get(input, row, c) != 0.0 {
      continue;
    }
    let val_cr = csr_get(input, c as usize, row as u32);
    let val = combine(0.0, val_cr, mix, prod_coeff);
    if val != 0.0 {
      emit(c, val);
    }
  }
}

/// Symmetrise a directed membership graph with the fuzzy set union /
/// intersection blend, building the output CSR directly.
fn apply_set_operations_parallel(input: &SparseMat, set_op_mix_ratio: f32) -> SparseMat {
  let n_samples = input.shape().0;
  let prod_coeff = 1.0 - 2.0 * set_op_mix_ratio;
  let csc = build_csc_structure(input);

  let row_counts: Vec<u32> = (0..n_samples)
    .into_par_iter()
    .map(|row| {
      let mut count = 0u32;
      for_each_union_entry(input, &csc, row, set_op_mix_ratio, prod_coeff, |_, _| {
        count += 1
      });
      count
    })
    .collect();
  let indptr = prefix_sum(row_counts, n_samples);
  let nnz = indptr[n_samples] as usize;

  let indices_vec = ParallelVec::filled(nnz, 0u32);
  let data_vec = ParallelVec::filled(nnz, 0.0f32);
  (0..n_samples).into_par_iter().for_each(|row| {
    let out_start = indptr[row] as usize;
    let mut offset = 0;
    for_each_union_entry(input, &csc, row, set_op_mix_ratio, prod_coeff, |col, val| {
      // SAFETY: each row writes only to [indptr[row]..indptr[row + 1]].
      unsafe {
        indices_vec.write(out_start + offset, col);
        data_vec.write(out_start + offset, val);
      }
      offset += 1;
    });
    let row_len = (indptr[row + 1] - indptr[row]) as usize;
    if row_len > 1 {
      // SAFETY: as above.
      let (row_indices, row_data) = unsafe {
        (
          indices_vec.get_mut_slice(out_start, row_len),
          data_vec.get_mut_slice(out_start, row_len),
        )
      };
      sort_row(row_indices, row_data);
    }
  });

  CsMatI::new(
    (n_samples, n_samples),
    indptr,
    indices_vec.into_inner(),
    data_vec.into_inner(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;

  fn graph_from(indices: ArrayView2<u32>, dists: ArrayView2<f32>, mix: f32) -> SparseMat {
    let none = DashSet::new();
    FuzzySimplicialSet::builder()
      .n_samples(indices.nrows())
      .n_neighbors(indices.ncols())
      .knn_indices(indices)
      .knn_dists(dists)
      .knn_disconnections(&none)
      .set_op_mix_ratio(mix)
      .build()
      .exec()
      .0
  }

  #[test]
  fn test_union_is_symmetric_without_self_loops() {
    let indices = array![[0u32, 1, 2], [1, 2, 0], [2, 1, 3], [3, 2, 1]];
    let dists = array![[0.0f32, 1.0, 2.5], [0.0, 0.7, 1.0], [0.0, 0.7, 1.9], [0.0, 1.9, 3.3]];
    for mix in [1.0, 0.5, 0.0] {
      let graph = graph_from(indices.view(), dists.view(), mix);
      for (r, row) in graph.outer_iterator().enumerate() {
        for (c, &v) in row.iter() {
          assert_ne!(r, c);
          assert!((0.0..=1.0).contains(&v));
          assert_eq!(graph.get(c, r).copied().unwrap_or(0.0), v);
        }
      }
    }
  }

  #[test]
  fn test_intersection_drops_one_way_edges() {
    let indices = array![[0u32, 1], [1, 2], [2, 1]];
    let dists = array![[0.0f32, 1.0], [0.0, 1.0], [0.0, 1.0]];
    let graph = graph_from(indices.view(), dists.view(), 0.0);
    assert!(graph.get(0, 1).is_none());
    assert!(graph.get(1, 2).is_some());
  }

  #[test]
  fn test_disconnected_edges_are_removed() {
    let indices = array![[0u32, 1], [1, 0]];
    let dists = array![[0.0f32, 5.0], [0.0, 5.0]];
    let removed = DashSet::new();
    removed.insert((0usize, 1usize));
    removed.insert((1usize, 1usize));
    let (graph, _, _) = FuzzySimplicialSet::builder()
      .n_samples(2)
      .n_neighbors(2)
      .knn_indices(indices.view())
      .knn_dists(dists.view())
      .knn_disconnections(&removed)
      .build()
      .exec();
    assert_eq!(graph.nnz(), 0);
  }
}
