use std::fmt::{Debug, Display};

// -------------------------------------------------------------------------------------------------

/// Provides smooth transitions between a current and target f32 value.
/// Smoothing usually needs to be applied to avoid clicks in e.g. volume or other DSP parameter changes.
pub trait SmoothedValue: Debug {
    /// Access to the current, possibly ramped value.
    #[must_use]
    fn current(&self) -> f32;
    /// Access to the target value.
    #[must_use]
    fn target(&self) -> f32;

    /// Ramp, if needed, and get the current ramped value, else returns the target value.
    #[must_use]
    fn next(&mut self) -> f32 {
        if self.need_ramp() {
            self.ramp();
            self.current()
        } else {
            self.target()
        }
    }

    /// Test if ramping is necessary. When ramping is not necessary, parameter changes
    /// may be applied in blocks without calling `next` or `ramp`, which usually is faster.
    #[must_use]
    fn need_ramp(&self) -> bool;
    /// Move current to target value, when ramping is necessary, else does nothing.
    fn ramp(&mut self);

    /// Set current and target to the same value.
    fn init(&mut self, amount: f32);
    /// Set a new target value and ramp current, when current is different from the target.
    fn set_target(&mut self, target: f32);

    /// Update sample rate of the smoothed value. Smoothed values are expected to be called
    /// once per audio frame and the ramping scales with the sample rate.
    fn set_sample_rate(&mut self, sample_rate: u32);
}

impl Display for dyn SmoothedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.need_ramp() {
            f.write_fmt(format_args!("{}(->{})", self.current(), self.target()))
        } else {
            f.write_fmt(format_args!("{}", self.target()))
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Linear smoothed value, which ramps linearly towards its target within a fixed ramp time.
///
/// A new target restarts the ramp from the current, possibly still ramping, value, so the
/// value never jumps by more than one step per sample, even under rapid target changes.
/// A single target change is reached after exactly `ramp_length` calls to `next` without
/// overshooting.
#[derive(Debug, Clone)]
pub struct LinearSmoothedValue {
    current: f32,
    target: f32,
    step: f32,
    num_pending_steps: u32,
    ramp_time: f32,
    ramp_length: u32,
    sample_rate: u32,
}

impl LinearSmoothedValue {
    /// Default ramp time in seconds.
    pub const DEFAULT_RAMP_TIME: f32 = 0.05;

    const UNINITIALIZED_SAMPLE_RATE: u32 = 0;

    pub fn new(value: f32, sample_rate: u32) -> Self {
        Self::with_ramp_time(value, Self::DEFAULT_RAMP_TIME, sample_rate)
    }

    pub fn with_ramp_time(value: f32, ramp_time: f32, sample_rate: u32) -> Self {
        assert!(ramp_time >= 0.0, "Invalid ramp time");
        let mut smoothed = Self {
            current: value,
            target: value,
            step: 0.0,
            num_pending_steps: 0,
            ramp_time,
            ramp_length: 0,
            sample_rate,
        };
        smoothed.update_ramp_length();
        smoothed
    }

    /// The ramp time in seconds.
    #[inline(always)]
    pub fn ramp_time(&self) -> f32 {
        self.ramp_time
    }

    /// Set a new ramp time in seconds. Applies to the next target change.
    pub fn set_ramp_time(&mut self, ramp_time: f32) {
        assert!(ramp_time >= 0.0, "Invalid ramp time");
        self.ramp_time = ramp_time;
        self.update_ramp_length();
    }

    /// The ramp time in sample frames, as calculated from the ramp time and sample rate.
    #[inline(always)]
    pub fn ramp_length(&self) -> u32 {
        self.ramp_length
    }

    /// Jump to the target value, stopping all pending ramps.
    pub fn reset(&mut self) {
        self.init(self.target);
    }

    fn update_ramp_length(&mut self) {
        self.ramp_length = (self.ramp_time * self.sample_rate as f32).round() as u32;
    }
}

impl SmoothedValue for LinearSmoothedValue {
    #[inline(always)]
    fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    fn target(&self) -> f32 {
        self.target
    }

    #[inline(always)]
    fn need_ramp(&self) -> bool {
        debug_assert!(
            self.sample_rate != Self::UNINITIALIZED_SAMPLE_RATE,
            "Call 'set_sample_rate' for default constructed smoothed values before using them!"
        );
        self.num_pending_steps > 0
    }

    fn ramp(&mut self) {
        if self.num_pending_steps > 0 {
            self.num_pending_steps -= 1;
            if self.num_pending_steps == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
    }

    fn init(&mut self, amount: f32) {
        self.target = amount;
        self.current = amount;
        self.num_pending_steps = 0;
    }

    fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_length == 0 || self.current == target {
            self.current = target;
            self.num_pending_steps = 0;
        } else {
            self.num_pending_steps = self.ramp_length;
            self.step = (target - self.current) / self.ramp_length as f32;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.update_ramp_length();
    }
}

impl Default for LinearSmoothedValue {
    fn default() -> Self {
        Self::new(0.0, Self::UNINITIALIZED_SAMPLE_RATE)
    }
}

impl From<f32> for LinearSmoothedValue {
    fn from(value: f32) -> Self {
        Self::new(value, Self::UNINITIALIZED_SAMPLE_RATE)
    }
}

// -------------------------------------------------------------------------------------------------
