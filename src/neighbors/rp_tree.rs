use crate::data::Dataset;
use crate::data::Row;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Trees deeper than this stop splitting and emit an oversized leaf.
const MAX_DEPTH: usize = 200;

/// A splitting hyperplane. `margin(x) = normal . x + offset`; points with a
/// non-negative margin go left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Hyperplane {
  Dense {
    normal: Vec<f32>,
    offset: f32,
  },
  Sparse {
    indices: Vec<usize>,
    data: Vec<f32>,
    offset: f32,
  },
}

impl Hyperplane {
  fn margin(&self, row: Row) -> f32 {
    match (self, row) {
      (Hyperplane::Dense { normal, offset }, Row::Dense(x)) => {
        offset + normal.iter().zip(x.iter()).map(|(n, v)| n * v).sum::<f32>()
      }
      (Hyperplane::Dense { normal, offset }, Row::Sparse(x)) => {
        offset
          + x
            .indices
            .iter()
            .zip(x.data)
            .map(|(&j, v)| normal[j] * v)
            .sum::<f32>()
      }
      (
        Hyperplane::Sparse {
          indices,
          data,
          offset,
        },
        Row::Dense(x),
      ) => offset + indices.iter().zip(data).map(|(&j, n)| n * x[j]).sum::<f32>(),
      (
        Hyperplane::Sparse {
          indices,
          data,
          offset,
        },
        Row::Sparse(x),
      ) => {
        let (mut i, mut j, mut dot) = (0usize, 0usize, 0.0f32);
        while i < indices.len() && j < x.indices.len() {
          match indices[i].cmp(&x.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
              dot += data[i] * x.data[j];
              i += 1;
              j += 1;
            }
          }
        }
        offset + dot
      }
    }
  }

  /// Hyperplane equidistant between rows `l` and `r`.
  ///
  /// Euclidean: normal `l - r` through the midpoint. Angular: normal
  /// `l/|l| - r/|r|` through the origin, with zero norms treated as 1.
  fn between(l: Row, r: Row, n_features: usize, angular: bool) -> Self {
    match (l, r) {
      (Row::Sparse(l), Row::Sparse(r)) => {
        let (l_scale, r_scale) = if angular {
          (inv_norm(l.data.iter().copied()), inv_norm(r.data.iter().copied()))
        } else {
          (1.0, 1.0)
        };
        let mut indices = Vec::with_capacity(l.indices.len() + r.indices.len());
        let mut data = Vec::with_capacity(indices.capacity());
        let mut offset = 0.0f32;
        let (mut i, mut j) = (0usize, 0usize);
        while i < l.indices.len() || j < r.indices.len() {
          let li = l.indices.get(i).copied().unwrap_or(usize::MAX);
          let ri = r.indices.get(j).copied().unwrap_or(usize::MAX);
          let (col, lv, rv) = if li == ri {
            i += 1;
            j += 1;
            (li, l.data[i - 1], r.data[j - 1])
          } else if li < ri {
            i += 1;
            (li, l.data[i - 1], 0.0)
          } else {
            j += 1;
            (ri, 0.0, r.data[j - 1])
          };
          let n = lv * l_scale - rv * r_scale;
          if n != 0.0 {
            indices.push(col);
            data.push(n);
            if !angular {
              offset -= n * (lv + rv) * 0.5;
            }
          }
        }
        Hyperplane::Sparse {
          indices,
          data,
          offset,
        }
      }
      (l, r) => {
        let l = dense_row(l, n_features);
        let r = dense_row(r, n_features);
        let (l_scale, r_scale) = if angular {
          (inv_norm(l.iter().copied()), inv_norm(r.iter().copied()))
        } else {
          (1.0, 1.0)
        };
        let normal: Vec<f32> = l
          .iter()
          .zip(&r)
          .map(|(a, b)| a * l_scale - b * r_scale)
          .collect();
        let offset = if angular {
          0.0
        } else {
          -normal
            .iter()
            .zip(l.iter().zip(&r))
            .map(|(n, (a, b))| n * (a + b) * 0.5)
            .sum::<f32>()
        };
        Hyperplane::Dense { normal, offset }
      }
    }
  }
}

fn inv_norm(values: impl Iterator<Item = f32>) -> f32 {
  let norm = values.map(|v| v * v).sum::<f32>().sqrt();
  if norm > 0.0 {
    1.0 / norm
  } else {
    1.0
  }
}

fn dense_row(row: Row, n_features: usize) -> Vec<f32> {
  match row {
    Row::Dense(x) => x.to_vec(),
    Row::Sparse(x) => x.to_dense(n_features).to_vec(),
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpNode {
  Split {
    hyperplane: u32,
    left: u32,
    right: u32,
  },
  Leaf {
    start: u32,
    end: u32,
  },
}

/// A random projection tree stored as an arena of index-linked nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpTree {
  nodes: Vec<RpNode>,
  hyperplanes: Vec<Hyperplane>,
  leaf_indices: Vec<u32>,
}

impl RpTree {
  pub fn build(data: &Dataset, leaf_size: usize, angular: bool, seed: u64) -> Self {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_features = data.n_features();
    let mut nodes = vec![RpNode::Leaf { start: 0, end: 0 }];
    let mut hyperplanes = Vec::new();
    let mut leaf_indices = Vec::with_capacity(data.n_samples());

    let all: Vec<u32> = (0..data.n_samples() as u32).collect();
    let mut stack: Vec<(usize, Vec<u32>, usize)> = vec![(0, all, 0)];
    while let Some((node, indices, depth)) = stack.pop() {
      if indices.len() <= leaf_size.max(1) || depth >= MAX_DEPTH {
        let start = leaf_indices.len() as u32;
        leaf_indices.extend_from_slice(&indices);
        nodes[node] = RpNode::Leaf {
          start,
          end: leaf_indices.len() as u32,
        };
        continue;
      }

      let a = rng.random_range(0..indices.len());
      let mut b = rng.random_range(0..indices.len() - 1);
      if b >= a {
        b += 1;
      }
      let hyperplane = Hyperplane::between(
        data.row(indices[a] as usize),
        data.row(indices[b] as usize),
        n_features,
        angular,
      );

      let (mut left, mut right): (Vec<u32>, Vec<u32>) = indices
        .iter()
        .partition(|&&i| hyperplane.margin(data.row(i as usize)) >= 0.0);
      if left.is_empty() || right.is_empty() {
        let mut all = indices;
        right = all.split_off(all.len() / 2);
        left = all;
      }

      let left_id = nodes.len();
      nodes.push(RpNode::Leaf { start: 0, end: 0 });
      let right_id = nodes.len();
      nodes.push(RpNode::Leaf { start: 0, end: 0 });
      nodes[node] = RpNode::Split {
        hyperplane: hyperplanes.len() as u32,
        left: left_id as u32,
        right: right_id as u32,
      };
      hyperplanes.push(hyperplane);
      stack.push((right_id, right, depth + 1));
      stack.push((left_id, left, depth + 1));
    }

    Self {
      nodes,
      hyperplanes,
      leaf_indices,
    }
  }

  pub fn leaves(&self) -> impl Iterator<Item = &[u32]> + '_ {
    self.nodes.iter().filter_map(|node| match *node {
      RpNode::Leaf { start, end } => Some(&self.leaf_indices[start as usize..end as usize]),
      RpNode::Split { .. } => None,
    })
  }

  /// Route a query row down to its leaf.
  pub fn search(&self, query: Row) -> &[u32] {
    let mut node = 0usize;
    loop {
      match self.nodes[node] {
        RpNode::Leaf { start, end } => {
          return &self.leaf_indices[start as usize..end as usize];
        }
        RpNode::Split {
          hyperplane,
          left,
          right,
        } => {
          node = if self.hyperplanes[hyperplane as usize].margin(query) >= 0.0 {
            left as usize
          } else {
            right as usize
          };
        }
      }
    }
  }

  pub fn n_leaves(&self) -> usize {
    self
      .nodes
      .iter()
      .filter(|n| matches!(n, RpNode::Leaf { .. }))
      .count()
  }
}

/// A forest of independently seeded random projection trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpForest {
  trees: Vec<RpTree>,
  angular: bool,
  leaf_size: usize,
}

impl RpForest {
  /// Build `n_trees` trees in parallel. Per-tree seeds are drawn from `rng`
  /// up front, so the forest does not depend on the thread count.
  pub fn build(
    data: &Dataset,
    n_trees: usize,
    leaf_size: usize,
    angular: bool,
    rng: &mut StdRng,
  ) -> Self {
    let started = Instant::now();
    let seeds: Vec<u64> = (0..n_trees).map(|_| rng.random()).collect();
    let trees: Vec<RpTree> = seeds
      .into_par_iter()
      .map(|seed| RpTree::build(data, leaf_size, angular, seed))
      .collect();
    info!(
      duration_ms = started.elapsed().as_millis(),
      n_trees,
      leaf_size,
      angular,
      "rp_forest complete"
    );
    Self {
      trees,
      angular,
      leaf_size,
    }
  }

  pub fn n_trees(&self) -> usize {
    self.trees.len()
  }

  pub fn is_angular(&self) -> bool {
    self.angular
  }

  pub fn leaf_size(&self) -> usize {
    self.leaf_size
  }

  /// Every leaf of every tree.
  pub fn leaves(&self) -> impl Iterator<Item = &[u32]> + '_ {
    self.trees.iter().flat_map(|t| t.leaves())
  }

  /// One leaf per tree for the query row.
  pub fn search<'a>(&'a self, query: Row<'a>) -> impl Iterator<Item = &'a [u32]> + 'a {
    self.trees.iter().map(move |t| t.search(query))
  }
}
