/// Clamp a gradient component into [-4, 4].
#[inline(always)]
pub fn clip(val: f32) -> f32 {
  // Most gradients are already in range.
  if val > -4.0 && val < 4.0 {
    val
  } else if val <= -4.0 {
    -4.0
  } else {
    4.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clip_bounds() {
    assert_eq!(clip(0.5), 0.5);
    assert_eq!(clip(10.0), 4.0);
    assert_eq!(clip(-4.0), -4.0);
    assert_eq!(clip(f32::NEG_INFINITY), -4.0);
  }
}
