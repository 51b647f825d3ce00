use super::EpochSchedule;
use crate::umap::simplicial_set_embedding::EdgeList;
use crate::utils::clip::clip;
use crate::utils::rng::mix_seed;
use ndarray::ArrayView2;
use ndarray::ArrayViewMut2;
use rand::rngs::SmallRng;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use typed_builder::TypedBuilder;

/// Gradient pushed along every axis when a negative sample coincides with
/// the point.
const COINCIDENT_PUSH: f32 = 4.0;

/// Wrapper to allow concurrent mutable access to embedding arrays in parallel
/// SGD.
///
/// # Safety
///
/// This type explicitly allows data races on the underlying f32 values
/// (Hogwild! style updates). Occasional lost updates only add noise to an
/// already stochastic optimization. Only used when the caller opts into
/// parallel layout.
struct UnsafeSyncCell<T> {
  ptr: *mut T,
}

unsafe impl<T> Send for UnsafeSyncCell<T> {}
unsafe impl<T> Sync for UnsafeSyncCell<T> {}

impl<T> UnsafeSyncCell<T> {
  /// # Safety
  ///
  /// The pointer must stay valid for the lifetime of this cell.
  unsafe fn new(ptr: *mut T) -> Self {
    Self { ptr }
  }

  #[inline(always)]
  fn get(&self) -> *mut T {
    self.ptr
  }
}

/// Attractive coefficient -2ab d^(2(b-1)) / (1 + a d^(2b)) for squared
/// distance `dist_sq`.
#[inline(always)]
fn attraction(dist_sq: f32, a: f32, b: f32) -> f32 {
  if dist_sq > 0.0 {
    -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
  } else {
    0.0
  }
}

/// Repulsive coefficient 2 gamma b / ((0.001 + d^2)(1 + a d^(2b))).
#[inline(always)]
fn repulsion(dist_sq: f32, a: f32, b: f32, gamma: f32) -> f32 {
  if dist_sq > 0.0 {
    2.0 * gamma * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
  } else {
    0.0
  }
}

#[inline(always)]
fn tail_value(head: &ArrayViewMut2<f32>, tail: Option<&ArrayView2<f32>>, k: usize, d: usize) -> f32 {
  match tail {
    Some(t) => t[(k, d)],
    None => head[(k, d)],
  }
}

#[inline(always)]
fn squared_distance(
  head: &ArrayViewMut2<f32>,
  tail: Option<&ArrayView2<f32>>,
  j: usize,
  k: usize,
) -> f32 {
  let mut dist_sq = 0.0f32;
  for d in 0..head.ncols() {
    let diff = head[(j, d)] - tail_value(head, tail, k, d);
    dist_sq += diff * diff;
  }
  dist_sq
}

#[derive(Clone, Copy)]
struct EpochParams {
  a: f32,
  b: f32,
  gamma: f32,
  alpha: f32,
  epoch: usize,
  seed: u64,
}

/*
  Run one epoch of stochastic gradient descent on a Euclidean embedding,
  minimizing the fuzzy set cross entropy between the high dimensional graph
  and the low dimensional one.

  Every edge whose next sample epoch has come is pulled together; each
  sampled edge then draws (epoch - next_negative) / epochs_per_negative
  uniform random vertices that are pushed away from its head. Gradients are
  clipped to [-4, 4] per coordinate.

  With no tail embedding the edges connect points of `head_embedding` and
  both endpoints move. With a tail embedding (transform) the tails are the
  fixed reference points and only heads move.

  Sequential updates draw from one StdRng seeded by (seed, epoch), so a run
  is bit-reproducible and resumable at any epoch boundary. `parallel`
  switches to lock-free Hogwild! updates with per-edge generators, which is
  faster but not reproducible.
*/
#[derive(TypedBuilder)]
pub struct OptimizeLayoutEuclidean<'a, 'h, 't> {
  head_embedding: ArrayViewMut2<'h, f32>,
  #[builder(default)]
  tail_embedding: Option<ArrayView2<'t, f32>>,
  edges: &'a EdgeList,
  schedule: &'a mut EpochSchedule,
  a: f32,
  b: f32,
  #[builder(default = 1.0)]
  gamma: f32,
  alpha: f32,
  epoch: usize,
  seed: u64,
  #[builder(default = false)]
  parallel: bool,
}

impl<'a, 'h, 't> OptimizeLayoutEuclidean<'a, 'h, 't> {
  pub fn exec(self) {
    let Self {
      mut head_embedding,
      tail_embedding,
      edges,
      schedule,
      a,
      b,
      gamma,
      alpha,
      epoch,
      seed,
      parallel,
    } = self;
    let params = EpochParams {
      a,
      b,
      gamma,
      alpha,
      epoch,
      seed,
    };
    if parallel {
      single_epoch_parallel(&mut head_embedding, tail_embedding, edges, schedule, params);
    } else {
      single_epoch(&mut head_embedding, tail_embedding, edges, schedule, params);
    }
  }
}

fn single_epoch(
  head_embedding: &mut ArrayViewMut2<f32>,
  tail_embedding: Option<ArrayView2<f32>>,
  edges: &EdgeList,
  schedule: &mut EpochSchedule,
  params: EpochParams,
) {
  let EpochParams {
    a,
    b,
    gamma,
    alpha,
    epoch,
    seed,
  } = params;
  let tail = tail_embedding.as_ref();
  let move_other = tail.is_none();
  let n_vertices = tail.map_or(head_embedding.nrows(), |t| t.nrows());
  let dim = head_embedding.ncols();
  let n = epoch as f64;
  let mut rng = StdRng::seed_from_u64(mix_seed(seed, epoch as u64));

  for i in 0..edges.len() {
    if schedule.epoch_of_next_sample[i] > n {
      continue;
    }
    let j = edges.head[i] as usize;
    let k = edges.tail[i] as usize;

    let dist_sq = squared_distance(head_embedding, tail, j, k);
    let coeff = attraction(dist_sq, a, b);
    for d in 0..dim {
      let diff = head_embedding[(j, d)] - tail_value(head_embedding, tail, k, d);
      let grad = clip(coeff * diff);
      head_embedding[(j, d)] += grad * alpha;
      if move_other {
        head_embedding[(k, d)] -= grad * alpha;
      }
    }
    schedule.epoch_of_next_sample[i] += edges.epochs_per_sample[i];

    let n_neg_samples = ((n - schedule.epoch_of_next_negative_sample[i])
      / schedule.epochs_per_negative_sample[i]) as usize;
    for _ in 0..n_neg_samples {
      let k = rng.random_range(0..n_vertices);
      if move_other && j == k {
        continue;
      }
      let dist_sq = squared_distance(head_embedding, tail, j, k);
      let coeff = repulsion(dist_sq, a, b, gamma);
      for d in 0..dim {
        let grad = if coeff > 0.0 {
          clip(coeff * (head_embedding[(j, d)] - tail_value(head_embedding, tail, k, d)))
        } else {
          COINCIDENT_PUSH
        };
        head_embedding[(j, d)] += grad * alpha;
      }
    }
    if n_neg_samples > 0 {
      schedule.epoch_of_next_negative_sample[i] +=
        n_neg_samples as f64 * schedule.epochs_per_negative_sample[i];
    }
  }
}

fn single_epoch_parallel(
  head_embedding: &mut ArrayViewMut2<f32>,
  tail_embedding: Option<ArrayView2<f32>>,
  edges: &EdgeList,
  schedule: &mut EpochSchedule,
  params: EpochParams,
) {
  let EpochParams {
    a,
    b,
    gamma,
    alpha,
    epoch,
    seed,
  } = params;
  assert!(
    head_embedding.is_standard_layout(),
    "parallel layout needs a row-major embedding"
  );
  let move_other = tail_embedding.is_none();
  let dim = head_embedding.ncols();
  let n = epoch as f64;
  let epoch_seed = mix_seed(seed, epoch as u64);

  // SAFETY: the embedding outlives the parallel loop below. Concurrent
  // updates of the same row may race (Hogwild!).
  let head_cell = unsafe { UnsafeSyncCell::new(head_embedding.as_mut_ptr()) };
  let (tail_cell, n_vertices) = match &tail_embedding {
    Some(t) => {
      assert!(t.is_standard_layout(), "parallel layout needs a row-major tail");
      (unsafe { UnsafeSyncCell::new(t.as_ptr() as *mut f32) }, t.nrows())
    }
    None => (
      unsafe { UnsafeSyncCell::new(head_embedding.as_mut_ptr()) },
      head_embedding.nrows(),
    ),
  };
  let epochs_per_negative_sample = &schedule.epochs_per_negative_sample;

  schedule
    .epoch_of_next_sample
    .par_iter_mut()
    .zip(schedule.epoch_of_next_negative_sample.par_iter_mut())
    .enumerate()
    .for_each(|(i, (next_sample, next_negative))| {
      if *next_sample > n {
        return;
      }
      let j = edges.head[i] as usize;
      let k = edges.tail[i] as usize;

      // SAFETY: rows j and k are in bounds of their row-major buffers; the
      // tail buffer is only written when it aliases the head buffer.
      unsafe {
        let current = head_cell.get().add(j * dim);
        let other = tail_cell.get().add(k * dim);

        let mut dist_sq = 0.0f32;
        for d in 0..dim {
          let diff = *current.add(d) - *other.add(d);
          dist_sq += diff * diff;
        }
        let coeff = attraction(dist_sq, a, b);
        for d in 0..dim {
          let grad = clip(coeff * (*current.add(d) - *other.add(d)));
          *current.add(d) += grad * alpha;
          if move_other {
            *other.add(d) -= grad * alpha;
          }
        }
        *next_sample += edges.epochs_per_sample[i];

        let n_neg_samples =
          ((n - *next_negative) / epochs_per_negative_sample[i]) as usize;
        if n_neg_samples == 0 {
          return;
        }
        let mut rng = SmallRng::seed_from_u64(mix_seed(epoch_seed, i as u64));
        for _ in 0..n_neg_samples {
          let k = rng.random_range(0..n_vertices);
          if move_other && j == k {
            continue;
          }
          let other = tail_cell.get().add(k * dim);
          let mut dist_sq = 0.0f32;
          for d in 0..dim {
            let diff = *current.add(d) - *other.add(d);
            dist_sq += diff * diff;
          }
          let coeff = repulsion(dist_sq, a, b, gamma);
          for d in 0..dim {
            let grad = if coeff > 0.0 {
              clip(coeff * (*current.add(d) - *other.add(d)))
            } else {
              COINCIDENT_PUSH
            };
            *current.add(d) += grad * alpha;
          }
        }
        *next_negative += n_neg_samples as f64 * epochs_per_negative_sample[i];
      }
    });
}
