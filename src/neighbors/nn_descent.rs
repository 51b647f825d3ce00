use super::heap::NeighborHeap;
use super::rp_tree::RpForest;
use crate::data::Dataset;
use crate::metric::Metric;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;
use tracing::info;
use typed_builder::TypedBuilder;

/// Points whose local joins are evaluated together before their updates are
/// applied.
const JOIN_BLOCK: usize = 4096;

/// Leaves whose pair distances are evaluated together before insertion.
const LEAF_BLOCK: usize = 1024;

/*
  Approximate k-nearest neighbor graph by NN-descent.

  Every list starts with the point itself at distance 0, then receives all
  pairs from each forest leaf, then is topped up with random points. Each
  iteration samples new and old candidates per point (including reverse
  edges), joins new with new and new with old, and stops once an iteration
  changes fewer than delta * n * k entries.

  Distances are computed on rayon workers against the current lists; list
  updates are applied afterwards on one thread in a fixed order, so the
  result depends only on the seed.
*/
#[derive(TypedBuilder)]
pub struct NnDescent<'a> {
  data: &'a Dataset,
  metric: &'a dyn Metric,
  forest: &'a RpForest,
  n_neighbors: usize,
  n_iters: usize,
  #[builder(default = 60)]
  max_candidates: usize,
  #[builder(default = 0.001)]
  delta: f32,
}

impl<'a> NnDescent<'a> {
  pub fn exec(self, rng: &mut StdRng) -> (Array2<u32>, Array2<f32>) {
    let NnDescent {
      data,
      metric,
      forest,
      n_neighbors,
      n_iters,
      max_candidates,
      delta,
    } = self;
    let n_samples = data.n_samples();
    assert!(n_neighbors < n_samples, "n_neighbors must be < n_samples");

    let mut heaps: Vec<NeighborHeap> = (0..n_samples)
      .map(|i| {
        let mut heap = NeighborHeap::new(n_neighbors);
        heap.push(i as u32, 0.0, false);
        heap
      })
      .collect();

    let started = Instant::now();
    init_from_leaves(data, metric, forest, &mut heaps);
    init_random(data, metric, &mut heaps, rng);
    info!(
      duration_ms = started.elapsed().as_millis(),
      "nn_descent init complete"
    );

    let started = Instant::now();
    let threshold = (delta as f64 * n_samples as f64 * n_neighbors as f64) as usize;
    for iteration in 0..n_iters {
      let (new_candidates, old_candidates) = build_candidates(&mut heaps, max_candidates, rng);
      let updates = local_join(data, metric, &mut heaps, &new_candidates, &old_candidates);
      debug!(iteration, updates, threshold, "nn_descent iteration");
      if updates <= threshold {
        break;
      }
    }
    info!(
      duration_ms = started.elapsed().as_millis(),
      "nn_descent complete"
    );

    let mut indices = Array2::<u32>::zeros((n_samples, n_neighbors));
    let mut distances = Array2::<f32>::zeros((n_samples, n_neighbors));
    for (i, heap) in heaps.iter().enumerate() {
      heap.write_row(indices.row_mut(i), distances.row_mut(i));
    }
    (indices, distances)
  }
}

/// Insert a symmetric update into both endpoint lists; returns the number of
/// lists that changed.
#[inline]
fn apply_pair(heaps: &mut [NeighborHeap], p: u32, q: u32, d: f32) -> usize {
  let mut changed = 0;
  if heaps[p as usize].push(q, d, true) {
    changed += 1;
  }
  if heaps[q as usize].push(p, d, true) {
    changed += 1;
  }
  changed
}

fn init_from_leaves(
  data: &Dataset,
  metric: &dyn Metric,
  forest: &RpForest,
  heaps: &mut [NeighborHeap],
) {
  let leaves: Vec<&[u32]> = forest.leaves().collect();
  for block in leaves.chunks(LEAF_BLOCK) {
    let heaps_ref: &[NeighborHeap] = &*heaps;
    let pairs: Vec<Vec<(u32, u32, f32)>> = block
      .par_iter()
      .map(|leaf| {
        let mut out = Vec::new();
        for (a, &p) in leaf.iter().enumerate() {
          for &q in &leaf[a + 1..] {
            let d = data.distance(metric, p as usize, q as usize);
            if d < heaps_ref[p as usize].worst() || d < heaps_ref[q as usize].worst() {
              out.push((p, q, d));
            }
          }
        }
        out
      })
      .collect();
    for (p, q, d) in pairs.into_iter().flatten() {
      apply_pair(heaps, p, q, d);
    }
  }
}

/// Top up every list with random points. Draws are capped at `n_samples`
/// per point, after which a scan in index order fills what is left. A list
/// stays short only when the metric rejects every remaining point.
fn init_random(data: &Dataset, metric: &dyn Metric, heaps: &mut [NeighborHeap], rng: &mut StdRng) {
  let n_samples = heaps.len();
  for i in 0..n_samples {
    for _ in 0..n_samples {
      if heaps[i].is_full() {
        break;
      }
      let j = rng.random_range(0..n_samples) as u32;
      if heaps[i].contains(j) {
        continue;
      }
      let d = data.distance(metric, i, j as usize);
      heaps[i].push(j, d, true);
    }
    for j in 0..n_samples as u32 {
      if heaps[i].is_full() {
        break;
      }
      if !heaps[i].contains(j) {
        let d = data.distance(metric, i, j as usize);
        heaps[i].push(j, d, true);
      }
    }
  }
}

/// Sample up to `max_candidates` new and old candidates per point, using
/// random priorities shared between an edge and its reverse. A new entry is
/// marked old in its owner's list only if the owner kept it as a forward
/// candidate; entries that only arrived as someone's reverse edge stay new.
fn build_candidates(
  heaps: &mut [NeighborHeap],
  max_candidates: usize,
  rng: &mut StdRng,
) -> (Vec<NeighborHeap>, Vec<NeighborHeap>) {
  let n_samples = heaps.len();
  let mut new_candidates: Vec<NeighborHeap> = (0..n_samples)
    .map(|_| NeighborHeap::new(max_candidates))
    .collect();
  let mut old_candidates: Vec<NeighborHeap> = (0..n_samples)
    .map(|_| NeighborHeap::new(max_candidates))
    .collect();

  for (p, heap) in heaps.iter().enumerate() {
    for e in heap.entries() {
      if e.index as usize == p {
        continue;
      }
      let priority: f32 = rng.random();
      let target = if e.is_new {
        &mut new_candidates
      } else {
        &mut old_candidates
      };
      target[p].push(e.index, priority, true);
      target[e.index as usize].push(p as u32, priority, false);
    }
  }

  for (p, heap) in heaps.iter_mut().enumerate() {
    let sampled = &new_candidates[p];
    heap.mark_old_where(|q| sampled.contains_new(q));
  }

  (new_candidates, old_candidates)
}

fn local_join(
  data: &Dataset,
  metric: &dyn Metric,
  heaps: &mut [NeighborHeap],
  new_candidates: &[NeighborHeap],
  old_candidates: &[NeighborHeap],
) -> usize {
  let n_samples = heaps.len();
  let mut updates = 0usize;
  let mut start = 0usize;
  while start < n_samples {
    let end = (start + JOIN_BLOCK).min(n_samples);
    let heaps_ref: &[NeighborHeap] = &*heaps;
    let pairs: Vec<Vec<(u32, u32, f32)>> = (start..end)
      .into_par_iter()
      .map(|p| {
        let mut out = Vec::new();
        let new = new_candidates[p].entries();
        let old = old_candidates[p].entries();
        let mut consider = |u: u32, v: u32| {
          if u == v {
            return;
          }
          let d = data.distance(metric, u as usize, v as usize);
          if d < heaps_ref[u as usize].worst() || d < heaps_ref[v as usize].worst() {
            out.push((u, v, d));
          }
        };
        for (a, u) in new.iter().enumerate() {
          for v in &new[a + 1..] {
            consider(u.index, v.index);
          }
          for v in old {
            consider(u.index, v.index);
          }
        }
        out
      })
      .collect();
    for (u, v, d) in pairs.into_iter().flatten() {
      updates += apply_pair(heaps, u, v, d);
    }
    start = end;
  }
  updates
}
