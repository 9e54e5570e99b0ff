//! Schroeder allpass stages, used to diffuse discrete echoes.

use super::delay::CircularBuffer;

// -------------------------------------------------------------------------------------------------

/// Multi channel Schroeder allpass filter with a fixed integer delay.
///
/// Stable for coefficient magnitudes below 1.
#[derive(Debug, Clone)]
pub struct AllpassFilter<const CHANNELS: usize> {
    buffer: CircularBuffer<CHANNELS>,
    delay: usize,
}

impl<const CHANNELS: usize> AllpassFilter<CHANNELS> {
    /// Ring buffer size of allpass stages.
    pub const BUFFER_SIZE: usize = 1024;

    /// Create a new allpass stage with the given delay in sample frames.
    pub fn new(delay: usize) -> Self {
        assert!(
            delay > 0 && delay < Self::BUFFER_SIZE,
            "Invalid allpass delay"
        );
        Self {
            buffer: CircularBuffer::new(Self::BUFFER_SIZE),
            delay,
        }
    }

    /// The stage's delay in sample frames.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Silence the delay line.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Process a single frame with the given feedback coefficient.
    #[inline]
    pub fn process(&mut self, input: [f32; CHANNELS], coefficient: f32) -> [f32; CHANNELS] {
        debug_assert!(coefficient.abs() < 1.0, "Unstable allpass coefficient");
        let delayed = self.buffer.read_interpolated((self.delay - 1) as f32);
        let mut output = [0.0; CHANNELS];
        let mut feed = [0.0; CHANNELS];
        #[allow(clippy::needless_range_loop)]
        for ch in 0..CHANNELS {
            output[ch] = delayed[ch] - coefficient * input[ch];
            feed[ch] = input[ch] + coefficient * output[ch];
        }
        self.buffer.write(feed);
        output
    }
}

// -------------------------------------------------------------------------------------------------

/// A bank of allpass stages with mutually prime delays.
#[derive(Debug, Clone)]
pub struct AllpassBank<const CHANNELS: usize> {
    stages: [AllpassFilter<CHANNELS>; 4],
}

impl<const CHANNELS: usize> AllpassBank<CHANNELS> {
    /// Delays of the bank's stages in sample frames.
    pub const DELAYS: [usize; 4] = [113, 199, 421, 677];

    pub fn new() -> Self {
        Self {
            stages: Self::DELAYS.map(AllpassFilter::new),
        }
    }

    /// Number of stages in the bank.
    pub const fn stage_count(&self) -> usize {
        Self::DELAYS.len()
    }

    /// Silence all stages.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Access a single stage. Returns `None` for out of range indices.
    pub fn stage_mut(&mut self, index: usize) -> Option<&mut AllpassFilter<CHANNELS>> {
        self.stages.get_mut(index)
    }
}

impl<const CHANNELS: usize> Default for AllpassBank<CHANNELS> {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_response_is_delayed() {
        let mut allpass = AllpassFilter::<1>::new(3);
        let coefficient = 0.5;
        let mut response = Vec::new();
        response.push(allpass.process([1.0], coefficient)[0]);
        for _ in 0..6 {
            response.push(allpass.process([0.0], coefficient)[0]);
        }
        assert_eq!(response[0], -0.5);
        assert_eq!(response[1], 0.0);
        assert_eq!(response[2], 0.0);
        assert!((response[3] - 0.75).abs() < 1e-6);
        assert_eq!(response[4], 0.0);
    }

    #[test]
    fn diffusion_stays_bounded() {
        let mut bank = AllpassBank::<2>::new();
        for coefficient in [0.5, 0.85, -0.95, 0.999] {
            bank.reset();
            let mut peak = 0.0f32;
            let mut energy = 0.0f64;
            for n in 0..20000 {
                let input = if n == 0 { [1.0, -1.0] } else { [0.0, 0.0] };
                let mut frame = input;
                for index in 0..bank.stage_count() {
                    frame = bank.stage_mut(index).unwrap().process(frame, coefficient);
                }
                peak = peak.max(frame[0].abs()).max(frame[1].abs());
                energy += (frame[0] as f64).powi(2);
                assert!(frame[0].is_finite() && frame[1].is_finite());
            }
            // allpass cascades preserve energy, so a unit impulse can't gain energy
            assert!(peak <= 1.0 + 1e-3, "peak {peak} with coefficient {coefficient}");
            assert!(energy <= 1.0 + 1e-3, "energy {energy} with coefficient {coefficient}");
        }
    }

    #[test]
    fn out_of_range_stage() {
        let mut bank = AllpassBank::<1>::new();
        assert!(bank.stage_mut(3).is_some());
        assert!(bank.stage_mut(4).is_none());
    }
}
