use std::f64;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Available filter types for the State Variable Filter.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SvfFilterType {
    #[default]
    Lowpass,
    Highpass,
}

// -------------------------------------------------------------------------------------------------

/// The coefficients that hold parameters and necessary data to process the filter.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SvfCoefficients {
    filter_type: SvfFilterType,
    sample_rate: u32,
    cutoff: f32,
    q: f32,
    a1: f64,
    a2: f64,
    a3: f64,
    m0: f64,
    m1: f64,
    m2: f64,
}

impl SvfCoefficients {
    /// Highest cutoff frequency, relative to the sample rate.
    pub const MAX_RELATIVE_CUTOFF: f32 = 0.49;

    /// Default, non resonant Q.
    pub const DEFAULT_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

    /// Create new coefficients for the given filter response.
    pub fn new(
        filter_type: SvfFilterType,
        sample_rate: u32,
        cutoff: f32,
        q: f32,
    ) -> Result<Self, Error> {
        let mut coefficients = Self::default();
        coefficients.set(filter_type, sample_rate, cutoff, q)?;
        Ok(coefficients)
    }

    /// Get currently applied filter type.
    pub fn filter_type(&self) -> SvfFilterType {
        self.filter_type
    }

    /// Get currently applied sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The frequency in Hz where the cutoff of the filter is, after clamping.
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Set the cutoff frequency in Hz. Frequencies at or above nyquist get clamped below it.
    pub fn set_cutoff(&mut self, cutoff: f32) -> Result<(), Error> {
        self.set(self.filter_type, self.sample_rate, cutoff, self.q)
    }

    /// The steepness of the filter.
    pub fn q(&self) -> f32 {
        self.q
    }

    /// Set and apply a batch of new filter parameters.
    pub fn set(
        &mut self,
        filter_type: SvfFilterType,
        sample_rate: u32,
        cutoff: f32,
        q: f32,
    ) -> Result<(), Error> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if q <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter Q: must be > 0, but is {q}"
            )));
        }
        if cutoff <= 0.0 {
            return Err(Error::ParameterError(format!(
                "Invalid filter frequency: must be > 0, but is {cutoff}"
            )));
        }
        let cutoff = cutoff.min(sample_rate as f32 * Self::MAX_RELATIVE_CUTOFF);
        if self.filter_type != filter_type
            || self.sample_rate != sample_rate
            || self.cutoff != cutoff
            || self.q != q
        {
            self.filter_type = filter_type;
            self.sample_rate = sample_rate;
            self.cutoff = cutoff;
            self.q = q;
            self.apply();
        }
        Ok(())
    }

    fn apply(&mut self) {
        let g = f64::tan(f64::consts::PI * self.cutoff as f64 / self.sample_rate as f64);
        let k = 1.0 / self.q as f64;
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        match self.filter_type {
            SvfFilterType::Lowpass => {
                self.m0 = 0.0;
                self.m1 = 0.0;
                self.m2 = 1.0;
            }
            SvfFilterType::Highpass => {
                self.m0 = 1.0;
                self.m1 = -k;
                self.m2 = -1.0;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Multi channel state variable filter (SVF), designed by Andrew Simper of Cytomic.
/// See <http://cytomic.com/files/dsp/SvfLinearTrapOptimised2.pdf>
///
/// This is a second-order, topology preserving filter with a 12 dB/octave slope.
/// Q = 0.707 means no resonant peaking. It is stable when modulated at high rates, so
/// coefficients may be shared and changed between blocks without resetting the state.
#[derive(Debug, Clone)]
pub struct SvfFilter<const CHANNELS: usize> {
    ic1eq: [f64; CHANNELS],
    ic2eq: [f64; CHANNELS],
}

impl<const CHANNELS: usize> SvfFilter<CHANNELS> {
    pub const fn new() -> Self {
        Self {
            ic1eq: [0.0; CHANNELS],
            ic2eq: [0.0; CHANNELS],
        }
    }

    /// Apply the filter on a single frame.
    #[inline]
    pub fn process_frame(
        &mut self,
        coefficients: &SvfCoefficients,
        input: [f32; CHANNELS],
    ) -> [f32; CHANNELS] {
        let mut output = [0.0; CHANNELS];
        #[allow(clippy::needless_range_loop)]
        for ch in 0..CHANNELS {
            let v0 = input[ch] as f64;
            let v3 = v0 - self.ic2eq[ch];
            let v1 = coefficients.a1 * self.ic1eq[ch] + coefficients.a2 * v3;
            let v2 = self.ic2eq[ch] + coefficients.a2 * self.ic1eq[ch] + coefficients.a3 * v3;
            self.ic1eq[ch] = 2.0 * v1 - self.ic1eq[ch];
            self.ic2eq[ch] = 2.0 * v2 - self.ic2eq[ch];
            output[ch] = (coefficients.m0 * v0 + coefficients.m1 * v1 + coefficients.m2 * v2) as f32;
        }
        output
    }

    /// Reset state of filter.
    /// Can be used when the audio callback is restarted.
    #[inline]
    pub fn reset(&mut self) {
        self.ic1eq = [0.0; CHANNELS];
        self.ic2eq = [0.0; CHANNELS];
    }
}

impl<const CHANNELS: usize> Default for SvfFilter<CHANNELS> {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_peak(coefficients: &SvfCoefficients, frequency: f32) -> f32 {
        let mut filter = SvfFilter::<1>::new();
        let sample_rate = coefficients.sample_rate() as f32;
        let mut peak = 0.0f32;
        for n in 0..48000 {
            let x = (std::f32::consts::TAU * frequency * n as f32 / sample_rate).sin();
            let y = filter.process_frame(coefficients, [x])[0];
            // skip the transient
            if n > 24000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn lowpass_and_highpass() {
        let lowpass =
            SvfCoefficients::new(SvfFilterType::Lowpass, 48000, 1000.0, SvfCoefficients::DEFAULT_Q)
                .unwrap();
        assert!(sine_peak(&lowpass, 100.0) > 0.95);
        assert!(sine_peak(&lowpass, 10000.0) < 0.05);

        let highpass =
            SvfCoefficients::new(SvfFilterType::Highpass, 48000, 1000.0, SvfCoefficients::DEFAULT_Q)
                .unwrap();
        assert!(sine_peak(&highpass, 100.0) < 0.05);
        assert!(sine_peak(&highpass, 10000.0) > 0.95);
    }

    #[test]
    fn cutoff_is_clamped_below_nyquist() {
        let mut coefficients =
            SvfCoefficients::new(SvfFilterType::Lowpass, 22050, 20000.0, 0.707).unwrap();
        assert_eq!(coefficients.cutoff(), 22050.0 * SvfCoefficients::MAX_RELATIVE_CUTOFF);
        assert!(coefficients.set_cutoff(5000.0).is_ok());
        assert_eq!(coefficients.cutoff(), 5000.0);
        assert!(coefficients.set_cutoff(0.0).is_err());
        assert!(SvfCoefficients::new(SvfFilterType::Highpass, 0, 100.0, 0.707).is_err());
        assert!(SvfCoefficients::new(SvfFilterType::Highpass, 44100, 100.0, 0.0).is_err());
    }
}
