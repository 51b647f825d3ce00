/// Tolerance for the smooth k-nearest neighbor bisection.
pub const SMOOTH_K_TOLERANCE: f32 = 1e-5;

/// Minimum sigma, as a fraction of the mean neighbor distance.
pub const MIN_K_DIST_SCALE: f32 = 1e-3;

/// Absolute sigma floor, reached when every neighbor distance is zero.
pub const MIN_SIGMA: f32 = 1e-8;

/// Maximum bisection steps when calibrating sigma.
pub const SMOOTH_K_ITERATIONS: usize = 64;
