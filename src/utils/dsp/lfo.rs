//! Slow oscillators for time modulation.

use std::f64::consts::TAU;

// -------------------------------------------------------------------------------------------------

/// Simple sine oscillator, used as LFO in effects.
///
/// Phases are expressed in cycles (`0.0..1.0`), rates in Hz.
#[derive(Debug, Default, Clone)]
pub struct Lfo {
    phase: f64,
    phase_inc: f64,
    initial_phase: f64,
}

impl Lfo {
    pub fn new(sample_rate: u32, rate: f64, initial_phase: f64) -> Self {
        let mut lfo = Self {
            phase: 0.0,
            phase_inc: 0.0,
            initial_phase: initial_phase.rem_euclid(1.0),
        };
        lfo.set_rate(sample_rate, rate);
        lfo.reset();
        lfo
    }

    /// Set a new rate in Hz with the given sampling rate.
    pub fn set_rate(&mut self, sample_rate: u32, rate: f64) {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        self.phase_inc = rate / sample_rate as f64;
    }

    /// Current phase in cycles.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Move the phase back to the phase the LFO got created with.
    pub fn reset(&mut self) {
        self.phase = self.initial_phase;
    }

    /// Returns the current value and advances the phase.
    #[inline]
    pub fn next(&mut self) -> f32 {
        let value = (self.phase * TAU).sin();
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value as f32
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_cycle() {
        let mut lfo = Lfo::new(100, 1.0, 0.0);
        let values = (0..100).map(|_| lfo.next()).collect::<Vec<_>>();
        assert!(values[0].abs() < 1e-6);
        assert!((values[25] - 1.0).abs() < 1e-4);
        assert!((values[75] + 1.0).abs() < 1e-4);
        assert!(lfo.phase() < 1e-9 || (lfo.phase() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn phase_offset_and_reset() {
        let mut lfo = Lfo::new(48000, 0.13, 0.25);
        assert!((lfo.next() - 1.0).abs() < 1e-6);
        for _ in 0..1000 {
            let _ = lfo.next();
        }
        lfo.reset();
        assert_eq!(lfo.phase(), 0.25);
        assert_eq!(Lfo::new(48000, 1.0, 1.33).phase(), 1.33f64.rem_euclid(1.0));
    }
}
