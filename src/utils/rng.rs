/// Derive an independent 64-bit seed for `stream` from a base seed.
///
/// SplitMix64 finalizer over the combined value; distinct streams give
/// unrelated seeds, so per-epoch and per-tree generators do not overlap.
#[inline]
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
  let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
  z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
  z ^ (z >> 31)
}
