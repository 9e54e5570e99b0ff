//! Lock-free telemetry, published by the effects in the audio thread and polled by UIs.
//!
//! Every value is an independent atomic scalar. Readers may observe values which got published
//! in different audio blocks: snapshots are advisory only and not consistent across fields.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::utils::AtomicF32;

// -------------------------------------------------------------------------------------------------

/// A copy of all values published by a [`GranularVisualizer`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GranularSnapshot {
    /// Number of active grains, relative to the grain pool size (`0..=1`).
    pub grain_activity: f32,
    /// Target pitch in semitones.
    pub current_pitch: f32,
    /// Peak absolute output level of the last processed block.
    pub output_level: f32,
    /// True while freeze is enabled.
    pub is_frozen: bool,
}

/// Telemetry of a [`GranularEffect`](crate::effects::GranularEffect).
#[derive(Debug, Default)]
pub struct GranularVisualizer {
    grain_activity: AtomicF32,
    current_pitch: AtomicF32,
    output_level: AtomicF32,
    is_frozen: AtomicBool,
}

impl GranularVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grain_activity(&self) -> f32 {
        self.grain_activity.load()
    }

    pub fn current_pitch(&self) -> f32 {
        self.current_pitch.load()
    }

    pub fn output_level(&self) -> f32 {
        self.output_level.load()
    }

    pub fn is_frozen(&self) -> bool {
        self.is_frozen.load(Ordering::Relaxed)
    }

    /// Read all values at once.
    pub fn snapshot(&self) -> GranularSnapshot {
        GranularSnapshot {
            grain_activity: self.grain_activity(),
            current_pitch: self.current_pitch(),
            output_level: self.output_level(),
            is_frozen: self.is_frozen(),
        }
    }

    pub(crate) fn set_grain_activity(&self, activity: f32) {
        self.grain_activity.store(activity);
    }

    pub(crate) fn set_current_pitch(&self, pitch: f32) {
        self.current_pitch.store(pitch);
    }

    pub(crate) fn set_output_level(&self, level: f32) {
        self.output_level.store(level);
    }

    pub(crate) fn set_frozen(&self, frozen: bool) {
        self.is_frozen.store(frozen, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

/// Maximum number of delay taps with a published level.
pub const MAX_TAP_LEVELS: usize = 4;

/// A copy of all values published by a [`DelayVisualizer`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelaySnapshot {
    /// Peak absolute input level of the last processed block.
    pub input_level: f32,
    /// The combined drift modulation signal (`-1..=1`).
    pub duck_envelope: f32,
    /// Peak absolute level of each tap. Unused taps are zero.
    pub tap_levels: [f32; MAX_TAP_LEVELS],
}

/// Telemetry of a [`DriftDelayEffect`](crate::effects::DriftDelayEffect).
#[derive(Debug, Default)]
pub struct DelayVisualizer {
    input_level: AtomicF32,
    duck_envelope: AtomicF32,
    tap_levels: [AtomicF32; MAX_TAP_LEVELS],
}

impl DelayVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_level(&self) -> f32 {
        self.input_level.load()
    }

    pub fn duck_envelope(&self) -> f32 {
        self.duck_envelope.load()
    }

    /// Level of the tap with the given index. Out of range taps are silent.
    pub fn tap_level(&self, tap: usize) -> f32 {
        self.tap_levels.get(tap).map_or(0.0, AtomicF32::load)
    }

    /// Read all values at once.
    pub fn snapshot(&self) -> DelaySnapshot {
        DelaySnapshot {
            input_level: self.input_level(),
            duck_envelope: self.duck_envelope(),
            tap_levels: std::array::from_fn(|tap| self.tap_level(tap)),
        }
    }

    pub(crate) fn publish(&self, input_level: f32, duck_envelope: f32, tap_levels: &[f32]) {
        self.input_level.store(input_level);
        self.duck_envelope.store(duck_envelope);
        for (index, level) in self.tap_levels.iter().enumerate() {
            level.store(tap_levels.get(index).copied().unwrap_or(0.0));
        }
    }

    pub(crate) fn clear(&self) {
        self.publish(0.0, 0.0, &[]);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn granular_snapshot() {
        let visualizer = Arc::new(GranularVisualizer::new());
        assert_eq!(visualizer.snapshot(), GranularSnapshot::default());

        let writer = {
            let visualizer = Arc::clone(&visualizer);
            std::thread::spawn(move || {
                visualizer.set_grain_activity(0.25);
                visualizer.set_current_pitch(-12.0);
                visualizer.set_output_level(0.8);
                visualizer.set_frozen(true);
            })
        };
        writer.join().unwrap();
        assert_eq!(
            visualizer.snapshot(),
            GranularSnapshot {
                grain_activity: 0.25,
                current_pitch: -12.0,
                output_level: 0.8,
                is_frozen: true
            }
        );
    }

    #[test]
    fn delay_taps_are_zero_filled() {
        let visualizer = DelayVisualizer::new();
        visualizer.publish(0.5, -0.2, &[0.4, 0.3]);
        let snapshot = visualizer.snapshot();
        assert_eq!(snapshot.input_level, 0.5);
        assert_eq!(snapshot.duck_envelope, -0.2);
        assert_eq!(snapshot.tap_levels, [0.4, 0.3, 0.0, 0.0]);
        assert_eq!(visualizer.tap_level(7), 0.0);

        visualizer.clear();
        assert_eq!(visualizer.snapshot(), DelaySnapshot::default());
    }
}
