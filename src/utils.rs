//! Shared helpers for the effect engines: level conversions, buffers, smoothing and DSP tools.

pub mod atomic;
pub mod buffer;
pub mod dsp;
pub mod smoothed;

pub use atomic::AtomicF32;
pub use buffer::InterleavedBufferMut;
pub use smoothed::{LinearSmoothedValue, SmoothedValue};

// -------------------------------------------------------------------------------------------------

const MINUS_INF_IN_DB: f32 = -200.0f32;

const LIN_TO_DB_FACTOR: f32 = 20.0f32 / std::f32::consts::LN_10;
const DB_TO_LIN_FACTOR: f32 = std::f32::consts::LN_10 / 20.0f32;

// -------------------------------------------------------------------------------------------------

/// Convert a linear gain factor to decibels. Values close to zero map to -200 dB.
pub fn linear_to_db(value: f32) -> f32 {
    if value == 1.0 {
        return 0.0; // avoid rounding errors at exactly 0 dB
    } else if value > 1e-12f32 {
        return value.ln() * LIN_TO_DB_FACTOR;
    }
    MINUS_INF_IN_DB
}

/// Convert decibels to a linear gain factor.
pub fn db_to_linear(value: f32) -> f32 {
    if value == 0.0f32 {
        return 1.0f32; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0f32
}

/// Map a normalized `0..=1` amount linearly into the `from..=to` range.
///
/// `to` may be smaller than `from` to map inverted ranges.
#[inline]
pub fn map_range(amount: f32, from: f32, to: f32) -> f32 {
    from + (to - from) * amount
}

// -------------------------------------------------------------------------------------------------
