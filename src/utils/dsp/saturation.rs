//! Soft clipping waveshapers.

/// Soft-knee saturation with a dry/wet blend.
///
/// `amount` in range `0..=1` raises the drive from 1x to 5x and crossfades from the clean
/// to the saturated signal. The saturated signal never exceeds a magnitude of 1.
#[inline]
pub fn soft_saturate(input: f32, amount: f32) -> f32 {
    if amount <= 0.0 {
        return input;
    }
    let drive = 1.0 + amount * 4.0;
    let driven = input * drive;
    let saturated = driven / (1.0 + driven.abs());
    input * (1.0 - amount) + saturated * amount
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_curve() {
        assert_eq!(soft_saturate(0.8, 0.0), 0.8);
        assert_eq!(soft_saturate(0.0, 1.0), 0.0);
        // fully saturated: 0.5 * 5 / (1 + 2.5)
        assert!((soft_saturate(0.5, 1.0) - 2.5 / 3.5).abs() < 1e-6);
        // odd symmetric
        assert_eq!(soft_saturate(-0.3, 0.6), -soft_saturate(0.3, 0.6));
        // bounded for large inputs
        assert!(soft_saturate(1000.0, 1.0) < 1.0);
    }
}
