pub mod clip;
pub mod linalg;
pub mod parallel_vec;
pub mod rng;
