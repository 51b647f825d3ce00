//! Fast, parallel Rust implementation of the UMAP dimensionality reduction
//! algorithm.
//!
//! UMAP (Uniform Manifold Approximation and Projection) embeds
//! high-dimensional data in a few dimensions while preserving local
//! neighborhood structure. This crate contains the whole pipeline:
//!
//! 1. approximate k-nearest neighbors by random projection forest and
//!    NN-descent, over dense or sparse data and any [`Metric`]
//! 2. per-point calibration of fuzzy-set distances and fusion into one
//!    symmetric weighted graph
//! 3. spectral initialization, with disconnected components laid out apart
//! 4. stochastic layout optimization with negative sampling
//! 5. out-of-sample transform of new points against a fitted model
//!
//! # Example
//!
//! ```ignore
//! use umap_engine::{Umap, UmapConfig};
//!
//! let mut config = UmapConfig::default();
//! config.graph.n_neighbors = 10;
//! config.metric = "cosine".to_string();
//!
//! let umap = Umap::new(config);
//! let fitted = umap.fit(data)?;          // Array2<f32> or sparse rows
//! let embedding = fitted.embedding();    // (n_samples, 2)
//! let placed = umap.transform(&fitted, new_data)?;
//! ```
//!
//! Runs are reproducible: the same `random_state` gives the same embedding
//! regardless of the thread count, unless `optimization.parallel` opts into
//! Hogwild! updates.
//!
//! The library logs through `tracing` and installs no subscriber.
//!
//! # Public API
//!
//! * [`Umap`] - fit and transform entry points
//! * [`FittedUmap`] - fitted model, serializable with serde
//! * [`UmapConfig`] - configuration parameters
//! * [`Optimizer`] - resumable, checkpointable layout optimization
//! * [`Metric`] and [`NamedMetric`] - distance functions
//! * [`Dataset`] - dense or sparse input
//! * [`trustworthiness`] - embedding quality

// Public modules
pub mod config;
pub mod data;
pub mod distances;
pub mod error;
pub mod manifold;
pub mod metric;
pub mod neighbors;
pub mod optimizer;
pub mod quality;

// Public re-exports (primary API)
pub use config::GraphParams;
pub use config::InitMethod;
pub use config::ManifoldParams;
pub use config::NeighborParams;
pub use config::OptimizationParams;
pub use config::UmapConfig;
pub use data::Dataset;
pub use data::SparseData;
pub use distances::NamedMetric;
pub use embedding::FittedUmap;
pub use embedding::Umap;
pub use error::Result;
pub use error::UmapError;
pub use manifold::LearnedManifold;
pub use metric::Metric;
pub use neighbors::ReferenceIndex;
pub use optimizer::Optimizer;
pub use quality::trustworthiness;
pub use umap::SparseMat;

// Internal modules (not exposed)
mod embedding;
mod layout;
mod umap;
mod utils;

#[cfg(test)]
mod tests;
