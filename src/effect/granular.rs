use std::{f32::consts::TAU, sync::Arc};

use four_cc::FourCC;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    effect::{Effect, EffectTime},
    parameter::{
        BooleanParameter, BooleanParameterValue, FloatParameter, FloatParameterValue,
        ParameterHandle, ParameterValueUpdate, SmoothedParameterValue,
    },
    utils::{
        buffer::max_abs_sample,
        db_to_linear,
        dsp::{
            delay::CircularBuffer,
            filters::svf::{SvfCoefficients, SvfFilter, SvfFilterType},
        },
        map_range, InterleavedBufferMut, LinearSmoothedValue, SmoothedValue,
    },
    visualizer::GranularVisualizer,
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

/// Hann window, used as grain envelope. `phase` is the relative position in the grain (`0..=1`).
#[inline]
pub fn grain_envelope(phase: f32) -> f32 {
    0.5 * (1.0 - (TAU * phase).cos())
}

// -------------------------------------------------------------------------------------------------

/// A single grain voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Grain {
    active: bool,
    start: usize,
    age: usize,
    length: usize,
    pitch_ratio: f32,
    amplitude: f32,
    reverse: bool,
    pan: f32,
}

impl Grain {
    #[inline]
    fn read_position(&self) -> f32 {
        let offset = self.age as f32 * self.pitch_ratio;
        if self.reverse {
            self.start as f32 - offset
        } else {
            self.start as f32 + offset
        }
    }

    #[inline]
    fn gains(&self) -> (f32, f32) {
        let envelope = grain_envelope(self.age as f32 / self.length as f32) * self.amplitude;
        (
            envelope * (1.0 - self.pan * 0.5),
            envelope * (0.5 + self.pan * 0.5),
        )
    }
}

// -------------------------------------------------------------------------------------------------

// Parameter values of the granular effect, as seen by the audio thread.
struct GranularParameters {
    grain_size: FloatParameterValue,
    density: FloatParameterValue,
    spread: FloatParameterValue,
    pitch: FloatParameterValue,
    pitch_scatter: FloatParameterValue,
    shimmer: SmoothedParameterValue,
    stretch: FloatParameterValue,
    reverse: FloatParameterValue,
    freeze: BooleanParameterValue,
    blur: FloatParameterValue,
    warmth: FloatParameterValue,
    sparkle: FloatParameterValue,
    feedback: SmoothedParameterValue,
    mix: SmoothedParameterValue,
    output: FloatParameterValue,
    bypass: BooleanParameterValue,
}

impl GranularParameters {
    fn new() -> Self {
        let percent = |id: FourCC, name: &'static str, default: f32| {
            FloatParameter::new(id, name, 0.0..=1.0, default).with_percent_display()
        };
        let smoothed = |description: FloatParameter, ramp_time: f32| {
            SmoothedParameterValue::<LinearSmoothedValue>::from_description(description)
                .with_ramp_time(ramp_time)
        };
        Self {
            grain_size: FloatParameterValue::from_description(
                FloatParameter::new(
                    GranularEffect::GRAIN_SIZE_ID,
                    "Grain Size",
                    10.0..=500.0,
                    100.0, //
                )
                .with_unit("ms"),
            ),
            density: FloatParameterValue::from_description(
                FloatParameter::new(
                    GranularEffect::DENSITY_ID,
                    "Density",
                    1.0..=32.0,
                    8.0, //
                )
                .with_unit("Hz"),
            ),
            spread: FloatParameterValue::from_description(percent(
                GranularEffect::SPREAD_ID,
                "Spread",
                0.25,
            )),
            pitch: FloatParameterValue::from_description(
                FloatParameter::new(
                    GranularEffect::PITCH_ID,
                    "Pitch",
                    -24.0..=24.0,
                    0.0, //
                )
                .with_unit("st"),
            ),
            pitch_scatter: FloatParameterValue::from_description(percent(
                GranularEffect::PITCH_SCATTER_ID,
                "Pitch Scatter",
                0.0,
            )),
            shimmer: smoothed(
                percent(GranularEffect::SHIMMER_ID, "Shimmer", 0.0),
                0.05, //
            ),
            stretch: FloatParameterValue::from_description(
                FloatParameter::new(
                    GranularEffect::STRETCH_ID,
                    "Stretch",
                    0.25..=4.0,
                    1.0, //
                )
                .with_unit("x"),
            ),
            reverse: FloatParameterValue::from_description(percent(
                GranularEffect::REVERSE_ID,
                "Reverse",
                0.0,
            )),
            freeze: BooleanParameterValue::from_description(BooleanParameter::new(
                GranularEffect::FREEZE_ID,
                "Freeze",
                false,
            )),
            blur: FloatParameterValue::from_description(percent(
                GranularEffect::BLUR_ID,
                "Blur",
                0.0,
            )),
            warmth: FloatParameterValue::from_description(percent(
                GranularEffect::WARMTH_ID,
                "Warmth",
                0.3,
            )),
            sparkle: FloatParameterValue::from_description(percent(
                GranularEffect::SPARKLE_ID,
                "Sparkle",
                0.2,
            )),
            feedback: smoothed(
                percent(GranularEffect::FEEDBACK_ID, "Feedback", 0.3),
                0.05, //
            ),
            mix: smoothed(
                percent(GranularEffect::MIX_ID, "Mix", 0.5),
                0.02, //
            ),
            output: FloatParameterValue::from_description(
                FloatParameter::new(
                    GranularEffect::OUTPUT_ID,
                    "Output",
                    -24.0..=12.0,
                    0.0, //
                )
                .with_unit("dB"),
            ),
            bypass: BooleanParameterValue::from_description(BooleanParameter::new(
                GranularEffect::BYPASS_ID,
                "Bypass",
                false,
            )),
        }
    }

    fn descriptions(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.grain_size.description(),
            self.density.description(),
            self.spread.description(),
            self.pitch.description(),
            self.pitch_scatter.description(),
            self.shimmer.description(),
            self.stretch.description(),
            self.reverse.description(),
            self.freeze.description(),
            self.blur.description(),
            self.warmth.description(),
            self.sparkle.description(),
            self.feedback.description(),
            self.mix.description(),
            self.output.description(),
            self.bypass.description(),
        ]
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.shimmer.set_sample_rate(sample_rate);
        self.feedback.set_sample_rate(sample_rate);
        self.mix.set_sample_rate(sample_rate);
    }

    fn skip_ramps(&mut self) {
        self.shimmer.skip_ramp();
        self.feedback.skip_ramp();
        self.mix.skip_ramp();
    }

    // Set a plain value, as read from the parameter store. Returns false for unknown ids.
    fn set_plain_value(&mut self, id: FourCC, value: f32) -> bool {
        match id {
            _ if id == GranularEffect::GRAIN_SIZE_ID => self.grain_size.set_value_clamped(value),
            _ if id == GranularEffect::DENSITY_ID => self.density.set_value_clamped(value),
            _ if id == GranularEffect::SPREAD_ID => self.spread.set_value_clamped(value),
            _ if id == GranularEffect::PITCH_ID => self.pitch.set_value_clamped(value),
            _ if id == GranularEffect::PITCH_SCATTER_ID => {
                self.pitch_scatter.set_value_clamped(value)
            }
            _ if id == GranularEffect::SHIMMER_ID => self.shimmer.set_target_value_clamped(value),
            _ if id == GranularEffect::STRETCH_ID => self.stretch.set_value_clamped(value),
            _ if id == GranularEffect::REVERSE_ID => self.reverse.set_value_clamped(value),
            _ if id == GranularEffect::FREEZE_ID => self.freeze.set_value(value >= 0.5),
            _ if id == GranularEffect::BLUR_ID => self.blur.set_value_clamped(value),
            _ if id == GranularEffect::WARMTH_ID => self.warmth.set_value_clamped(value),
            _ if id == GranularEffect::SPARKLE_ID => self.sparkle.set_value_clamped(value),
            _ if id == GranularEffect::FEEDBACK_ID => {
                self.feedback.set_target_value_clamped(value)
            }
            _ if id == GranularEffect::MIX_ID => self.mix.set_target_value_clamped(value),
            _ if id == GranularEffect::OUTPUT_ID => self.output.set_value_clamped(value),
            _ if id == GranularEffect::BYPASS_ID => self.bypass.set_value(value >= 0.5),
            _ => return false,
        }
        true
    }

    // Apply an update and return the resulting plain value. Returns None for unknown ids.
    fn apply_update(&mut self, id: FourCC, update: &ParameterValueUpdate) -> Option<f32> {
        let flag = |value: bool| if value { 1.0 } else { 0.0 };
        let value = match id {
            _ if id == GranularEffect::GRAIN_SIZE_ID => {
                self.grain_size.apply_update(update);
                self.grain_size.value()
            }
            _ if id == GranularEffect::DENSITY_ID => {
                self.density.apply_update(update);
                self.density.value()
            }
            _ if id == GranularEffect::SPREAD_ID => {
                self.spread.apply_update(update);
                self.spread.value()
            }
            _ if id == GranularEffect::PITCH_ID => {
                self.pitch.apply_update(update);
                self.pitch.value()
            }
            _ if id == GranularEffect::PITCH_SCATTER_ID => {
                self.pitch_scatter.apply_update(update);
                self.pitch_scatter.value()
            }
            _ if id == GranularEffect::SHIMMER_ID => {
                self.shimmer.apply_update(update);
                self.shimmer.target_value()
            }
            _ if id == GranularEffect::STRETCH_ID => {
                self.stretch.apply_update(update);
                self.stretch.value()
            }
            _ if id == GranularEffect::REVERSE_ID => {
                self.reverse.apply_update(update);
                self.reverse.value()
            }
            _ if id == GranularEffect::FREEZE_ID => {
                self.freeze.apply_update(update);
                flag(self.freeze.value())
            }
            _ if id == GranularEffect::BLUR_ID => {
                self.blur.apply_update(update);
                self.blur.value()
            }
            _ if id == GranularEffect::WARMTH_ID => {
                self.warmth.apply_update(update);
                self.warmth.value()
            }
            _ if id == GranularEffect::SPARKLE_ID => {
                self.sparkle.apply_update(update);
                self.sparkle.value()
            }
            _ if id == GranularEffect::FEEDBACK_ID => {
                self.feedback.apply_update(update);
                self.feedback.target_value()
            }
            _ if id == GranularEffect::MIX_ID => {
                self.mix.apply_update(update);
                self.mix.target_value()
            }
            _ if id == GranularEffect::OUTPUT_ID => {
                self.output.apply_update(update);
                self.output.value()
            }
            _ if id == GranularEffect::BYPASS_ID => {
                self.bypass.apply_update(update);
                flag(self.bypass.value())
            }
            _ => return None,
        };
        Some(value)
    }
}

// -------------------------------------------------------------------------------------------------

/// Block-start snapshot of the parameters which drive grain scheduling.
#[derive(Debug, Clone, Copy)]
struct GrainSettings {
    length: usize,
    pitch: f32,
    pitch_scatter: f32,
    reverse: f32,
    spread: f32,
    frozen: bool,
}

// -------------------------------------------------------------------------------------------------

/// A stereo granular re-synthesis effect.
///
/// Overlaps up to [`Self::MAX_GRAINS`] short, Hann windowed grains, read from a rolling two
/// second history of the input. Grains are independently pitched, reversed and panned. The grain
/// mix gets blurred, filtered and fed back into the history and a short shimmer delay.
///
/// Freeze stops recording new input and lets grains read from a snapshot of the history instead.
pub struct GranularEffect {
    sample_rate: u32,
    parameters: GranularParameters,
    store: ParameterHandle,
    visualizer: Arc<GranularVisualizer>,
    rng: SmallRng,
    output_gain: LinearSmoothedValue,
    grains: [Grain; Self::MAX_GRAINS],
    grain_buffer: CircularBuffer<2>,
    freeze_buffer: CircularBuffer<2>,
    shimmer_buffer: CircularBuffer<2>,
    shimmer_delay: usize,
    trigger_counter: usize,
    was_frozen: bool,
    blur_state: [f32; 2],
    warmth_coefficients: SvfCoefficients,
    warmth_filter: SvfFilter<2>,
    sparkle_coefficients: SvfCoefficients,
    sparkle_filter: SvfFilter<2>,
}

impl GranularEffect {
    pub const EFFECT_NAME: &str = "Granular";
    pub const GRAIN_SIZE_ID: FourCC = FourCC(*b"gsiz");
    pub const DENSITY_ID: FourCC = FourCC(*b"dens");
    pub const SPREAD_ID: FourCC = FourCC(*b"sprd");
    pub const PITCH_ID: FourCC = FourCC(*b"pich");
    pub const PITCH_SCATTER_ID: FourCC = FourCC(*b"scat");
    pub const SHIMMER_ID: FourCC = FourCC(*b"shim");
    pub const STRETCH_ID: FourCC = FourCC(*b"strc");
    pub const REVERSE_ID: FourCC = FourCC(*b"revs");
    pub const FREEZE_ID: FourCC = FourCC(*b"frez");
    pub const BLUR_ID: FourCC = FourCC(*b"blur");
    pub const WARMTH_ID: FourCC = FourCC(*b"warm");
    pub const SPARKLE_ID: FourCC = FourCC(*b"sprk");
    pub const FEEDBACK_ID: FourCC = FourCC(*b"fdbk");
    pub const MIX_ID: FourCC = FourCC(*b"mix_");
    pub const OUTPUT_ID: FourCC = FourCC(*b"outp");
    pub const BYPASS_ID: FourCC = FourCC(*b"byps");

    /// Size of the grain voice pool.
    pub const MAX_GRAINS: usize = 32;

    const GRAIN_BUFFER_SECONDS: f32 = 2.0;
    const SHIMMER_BUFFER_SECONDS: f32 = 0.1;
    const SHIMMER_DELAY_SECONDS: f32 = 0.05;
    const OUTPUT_RAMP_TIME: f32 = 0.02;

    /// Creates a new `GranularEffect` with default parameter values and a randomly seeded
    /// random number generator.
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    /// Creates a new `GranularEffect` with default parameter values and a deterministic grain
    /// scheduler, using the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        let parameters = GranularParameters::new();
        let store = ParameterHandle::new(&parameters.descriptions());
        Self {
            sample_rate: 0,
            parameters,
            store,
            visualizer: Arc::new(GranularVisualizer::new()),
            rng,
            output_gain: LinearSmoothedValue::with_ramp_time(1.0, Self::OUTPUT_RAMP_TIME, 0),
            grains: [Grain::default(); Self::MAX_GRAINS],
            grain_buffer: CircularBuffer::default(),
            freeze_buffer: CircularBuffer::default(),
            shimmer_buffer: CircularBuffer::default(),
            shimmer_delay: 1,
            trigger_counter: 0,
            was_frozen: false,
            blur_state: [0.0; 2],
            warmth_coefficients: SvfCoefficients::default(),
            warmth_filter: SvfFilter::new(),
            sparkle_coefficients: SvfCoefficients::default(),
            sparkle_filter: SvfFilter::new(),
        }
    }

    /// Shared telemetry of this effect instance.
    pub fn visualizer(&self) -> Arc<GranularVisualizer> {
        Arc::clone(&self.visualizer)
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.grains.iter().filter(|grain| grain.active).count()
    }

    fn pull_parameters(&mut self) {
        for (id, value) in self.store.values() {
            let known = self.parameters.set_plain_value(id, value);
            debug_assert!(known, "Unexpected parameter '{id}' in parameter store");
        }
    }

    fn update_filters(&mut self) -> Result<(), Error> {
        let warmth_cutoff = map_range(self.parameters.warmth.value(), 20000.0, 2000.0);
        self.warmth_coefficients.set_cutoff(warmth_cutoff)?;
        let sparkle_cutoff = map_range(self.parameters.sparkle.value(), 8000.0, 2000.0);
        self.sparkle_coefficients.set_cutoff(sparkle_cutoff)?;
        Ok(())
    }

    // Start a new grain in the first free voice slot. Returns false when all slots are busy.
    fn trigger_grain(&mut self, settings: &GrainSettings) -> bool {
        let Some(grain) = self.grains.iter_mut().find(|grain| !grain.active) else {
            return false;
        };
        let capacity = self.grain_buffer.capacity();

        let mut pitch = settings.pitch;
        if settings.pitch_scatter > 0.0 {
            pitch += (self.rng.random::<f32>() * 2.0 - 1.0) * settings.pitch_scatter * 12.0;
        }

        let start = if settings.frozen {
            ((self.rng.random::<f32>() * capacity as f32) as usize).min(capacity - 1)
        } else {
            let max_offset = (settings.spread * capacity as f32 * 0.5) as isize;
            let offset = ((self.rng.random::<f32>() * 2.0 - 1.0) * max_offset as f32) as isize;
            let newest = self.grain_buffer.write_pos() as isize - 1;
            (newest - settings.length as isize + offset).rem_euclid(capacity as isize) as usize
        };

        let reverse = self.rng.random::<f32>() < settings.reverse;
        let pan = self.rng.random::<f32>();
        let amplitude = 0.7 + self.rng.random::<f32>() * 0.3;

        *grain = Grain {
            active: true,
            start,
            age: 0,
            length: settings.length,
            pitch_ratio: 2.0f32.powf(pitch / 12.0),
            amplitude,
            reverse,
            pan,
        };
        true
    }
}

impl Default for GranularEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GranularEffect {
    fn name(&self) -> &'static str {
        Self::EFFECT_NAME
    }

    fn parameters(&self) -> Vec<&dyn ClonableParameter> {
        self.parameters.descriptions()
    }

    fn parameter_handle(&self) -> ParameterHandle {
        self.store.clone()
    }

    fn initialize(
        &mut self,
        sample_rate: u32,
        channel_count: usize,
        max_frames: usize,
    ) -> Result<(), Error> {
        if !self.supports_channel_count(channel_count) {
            log::warn!("{} only supports stereo I/O", self.name());
            return Err(Error::UnsupportedChannelLayout(channel_count));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        if max_frames == 0 {
            return Err(Error::InvalidBlockSize(max_frames));
        }
        self.sample_rate = sample_rate;

        let grain_buffer_size = (Self::GRAIN_BUFFER_SECONDS * sample_rate as f32) as usize;
        self.grain_buffer = CircularBuffer::new(grain_buffer_size.max(4));
        self.freeze_buffer = CircularBuffer::new(self.grain_buffer.capacity());
        let shimmer_buffer_size = (Self::SHIMMER_BUFFER_SECONDS * sample_rate as f32) as usize;
        self.shimmer_buffer = CircularBuffer::new(shimmer_buffer_size.max(2));
        self.shimmer_delay = ((Self::SHIMMER_DELAY_SECONDS * sample_rate as f32) as usize)
            .clamp(1, self.shimmer_buffer.capacity());

        self.parameters.set_sample_rate(sample_rate);
        self.output_gain.set_sample_rate(sample_rate);
        self.pull_parameters();
        self.parameters.skip_ramps();
        self.output_gain
            .init(db_to_linear(self.parameters.output.value()));

        self.warmth_coefficients = SvfCoefficients::new(
            SvfFilterType::Lowpass,
            sample_rate,
            20000.0,
            SvfCoefficients::DEFAULT_Q,
        )?;
        self.sparkle_coefficients = SvfCoefficients::new(
            SvfFilterType::Highpass,
            sample_rate,
            8000.0,
            SvfCoefficients::DEFAULT_Q,
        )?;
        self.update_filters()?;

        self.reset();

        log::debug!(
            "{}: initialized with {sample_rate} Hz, {} frames grain buffer, {} frames shimmer delay",
            self.name(),
            self.grain_buffer.capacity(),
            self.shimmer_delay
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.grain_buffer.clear();
        self.freeze_buffer.clear();
        self.shimmer_buffer.clear();
        self.grains = [Grain::default(); Self::MAX_GRAINS];
        self.trigger_counter = 0;
        self.was_frozen = false;
        self.blur_state = [0.0; 2];
        self.warmth_filter.reset();
        self.sparkle_filter.reset();
    }

    fn process(&mut self, output: &mut [f32], _time: &EffectTime) {
        if self.sample_rate == 0 {
            return;
        }
        self.pull_parameters();

        if self.parameters.bypass.value() {
            self.visualizer.set_grain_activity(0.0);
            return;
        }

        let frozen = self.parameters.freeze.value();
        let blur = self.parameters.blur.value();
        let warmth = self.parameters.warmth.value();
        let sparkle = self.parameters.sparkle.value();
        let settings = GrainSettings {
            length: ((self.parameters.grain_size.value() * self.sample_rate as f32 / 1000.0)
                as usize)
                .clamp(1, self.grain_buffer.capacity() - 2),
            pitch: self.parameters.pitch.value(),
            pitch_scatter: self.parameters.pitch_scatter.value(),
            reverse: self.parameters.reverse.value(),
            spread: self.parameters.spread.value(),
            frozen,
        };
        let trigger_interval = (self.sample_rate as f32 / self.parameters.density.value()) as usize;
        self.output_gain
            .set_target(db_to_linear(self.parameters.output.value()));

        self.visualizer.set_frozen(frozen);
        self.visualizer.set_current_pitch(settings.pitch);

        // cutoffs are always positive and the sample rate got validated in initialize
        let result = self.update_filters();
        debug_assert!(result.is_ok(), "Failed to update filter cutoffs");

        if frozen && !self.was_frozen {
            self.freeze_buffer.copy_from(&self.grain_buffer);
        }
        self.was_frozen = frozen;

        let mut active_grains = 0;
        for frame in output.as_frames_mut::<2>() {
            let dry = *frame;
            let mix = self.parameters.mix.next_value();
            let gain = self.output_gain.next();
            let feedback = self.parameters.feedback.next_value();
            let shimmer = self.parameters.shimmer.next_value();

            // the history keeps its position while frozen, but not its content
            if frozen {
                self.grain_buffer.skip();
            } else {
                self.grain_buffer.write(dry);
            }

            self.trigger_counter += 1;
            if self.trigger_counter >= trigger_interval {
                self.trigger_counter = 0;
                self.trigger_grain(&settings);
            }

            // mix all active grains
            let source = if frozen {
                &self.freeze_buffer
            } else {
                &self.grain_buffer
            };
            let mut wet = [0.0f32; 2];
            active_grains = 0;
            for grain in self.grains.iter_mut().filter(|grain| grain.active) {
                active_grains += 1;
                let [left, right] = source.read_at(grain.read_position());
                let (gain_left, gain_right) = grain.gains();
                wet[0] += left * gain_left;
                wet[1] += right * gain_right;
                grain.age += 1;
                if grain.age >= grain.length {
                    grain.active = false;
                }
            }

            // blur
            for (state, sample) in self.blur_state.iter_mut().zip(wet.iter_mut()) {
                *state = *state * blur + *sample * (1.0 - blur);
                *sample = *state;
            }

            if warmth > 0.0 {
                wet = self
                    .warmth_filter
                    .process_frame(&self.warmth_coefficients, wet);
            }

            if sparkle > 0.0 {
                let highs = self
                    .sparkle_filter
                    .process_frame(&self.sparkle_coefficients, wet);
                for (sample, high) in wet.iter_mut().zip(highs) {
                    *sample += high * sparkle * 0.5;
                }
            }

            // shimmer feedback delay
            if shimmer > 0.0 {
                let shimmer_tap = self
                    .shimmer_buffer
                    .read_interpolated((self.shimmer_delay - 1) as f32);
                for (sample, tap) in wet.iter_mut().zip(shimmer_tap) {
                    *sample += tap * shimmer * 0.5;
                }
                self.shimmer_buffer
                    .write([wet[0] * feedback, wet[1] * feedback]);
            }

            if !frozen && feedback > 0.0 {
                let regeneration = feedback * 0.3;
                self.grain_buffer
                    .accumulate_last([wet[0] * regeneration, wet[1] * regeneration]);
            }

            for ((out, dry), wet) in frame.iter_mut().zip(dry).zip(wet) {
                *out = (dry * (1.0 - mix) + wet * mix) * gain;
            }
        }

        self.visualizer
            .set_grain_activity(active_grains as f32 / Self::MAX_GRAINS as f32);
        self.visualizer.set_output_level(max_abs_sample(output));
    }

    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error> {
        match self.parameters.apply_update(id, value) {
            Some(plain_value) => self.store.set(id, plain_value),
            None => Err(Error::ParameterError(format!(
                "Unknown parameter: '{id}' for effect '{}'",
                self.name()
            ))),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;
    const BLOCK_SIZE: usize = 256;

    fn effect_with(parameters: &[(FourCC, f32)]) -> GranularEffect {
        let mut effect = GranularEffect::with_seed(0x5EED);
        let handle = effect.parameter_handle();
        for (id, value) in parameters {
            handle.set(*id, *value).unwrap();
        }
        effect.initialize(SAMPLE_RATE, 2, BLOCK_SIZE).unwrap();
        effect
    }

    // A decaying, detuned stereo test signal.
    fn input_block(block: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; BLOCK_SIZE * 2];
        for (index, frame) in buffer.as_frames_mut::<2>().iter_mut().enumerate() {
            let time = (block * BLOCK_SIZE + index) as f32 / SAMPLE_RATE as f32;
            frame[0] = 0.5 * (TAU * 220.0 * time).sin();
            frame[1] = 0.5 * (TAU * 330.0 * time).sin();
        }
        buffer
    }

    fn process_blocks(effect: &mut GranularEffect, blocks: usize) -> Vec<f32> {
        let mut rendered = Vec::new();
        for block in 0..blocks {
            let mut buffer = input_block(block);
            effect.process(&mut buffer, &EffectTime::default());
            rendered.extend_from_slice(&buffer);
        }
        rendered
    }

    #[test]
    fn hann_envelope_edges() {
        assert!(grain_envelope(0.0).abs() < 1e-6);
        assert!(grain_envelope(1.0).abs() < 1e-6);
        assert!((grain_envelope(0.5) - 1.0).abs() < 1e-6);
        assert!((grain_envelope(0.25) - grain_envelope(0.75)).abs() < 1e-6);
    }

    #[test]
    fn parameters_and_updates() {
        let mut effect = GranularEffect::with_seed(1);
        assert_eq!(effect.parameters().len(), 16);
        let handle = effect.parameter_handle();
        assert_eq!(handle.value(GranularEffect::GRAIN_SIZE_ID).unwrap(), 100.0);
        assert_eq!(handle.value(GranularEffect::WARMTH_ID).unwrap(), 0.3);

        let update = ParameterValueUpdate::Raw(Box::new(12.0f32));
        effect
            .process_parameter_update(GranularEffect::PITCH_ID, &update)
            .unwrap();
        assert_eq!(handle.value(GranularEffect::PITCH_ID).unwrap(), 12.0);

        let update = ParameterValueUpdate::Normalized(1.0);
        effect
            .process_parameter_update(GranularEffect::FREEZE_ID, &update)
            .unwrap();
        assert_eq!(handle.value(GranularEffect::FREEZE_ID).unwrap(), 1.0);

        let update = ParameterValueUpdate::Raw(Box::new(9000.0f32));
        effect
            .process_parameter_update(GranularEffect::GRAIN_SIZE_ID, &update)
            .unwrap();
        assert_eq!(handle.value(GranularEffect::GRAIN_SIZE_ID).unwrap(), 500.0);

        assert!(effect
            .process_parameter_update(FourCC(*b"nope"), &update)
            .is_err());
    }

    #[test]
    fn rejects_non_stereo_layouts() {
        let mut effect = GranularEffect::with_seed(1);
        assert!(matches!(
            effect.initialize(SAMPLE_RATE, 1, BLOCK_SIZE),
            Err(Error::UnsupportedChannelLayout(1))
        ));
        assert!(effect.initialize(0, 2, BLOCK_SIZE).is_err());
        assert!(effect.initialize(SAMPLE_RATE, 2, 0).is_err());
        assert!(effect.initialize(SAMPLE_RATE, 2, BLOCK_SIZE).is_ok());
    }

    #[test]
    fn grain_pool_is_bounded() {
        let mut effect = effect_with(&[]);
        let _ = process_blocks(&mut effect, 4);
        let settings = GrainSettings {
            length: 24000,
            pitch: 0.0,
            pitch_scatter: 0.5,
            reverse: 0.5,
            spread: 1.0,
            frozen: false,
        };
        while effect.active_grain_count() < GranularEffect::MAX_GRAINS {
            assert!(effect.trigger_grain(&settings));
        }
        let grains = effect.grains;
        for _ in 0..10 {
            assert!(!effect.trigger_grain(&settings));
        }
        assert_eq!(effect.grains, grains);
        assert_eq!(effect.active_grain_count(), GranularEffect::MAX_GRAINS);

        // densest and longest grains keep the pool within bounds too
        let mut effect = effect_with(&[
            (GranularEffect::DENSITY_ID, 32.0),
            (GranularEffect::GRAIN_SIZE_ID, 500.0),
        ]);
        let visualizer = effect.visualizer();
        for block in 0..400 {
            let mut buffer = input_block(block);
            effect.process(&mut buffer, &EffectTime::default());
            assert!(effect.active_grain_count() <= GranularEffect::MAX_GRAINS);
            assert!(visualizer.grain_activity() <= 1.0);
            assert!(buffer.iter().all(|sample| sample.is_finite()));
        }
        assert!(visualizer.grain_activity() > 0.0);
    }

    #[test]
    fn grain_placement() {
        let mut effect = effect_with(&[]);
        let _ = process_blocks(&mut effect, 2);
        let settings = GrainSettings {
            length: 4800,
            pitch: 12.0,
            pitch_scatter: 0.0,
            reverse: 0.0,
            spread: 0.0,
            frozen: false,
        };
        effect.grains = [Grain::default(); GranularEffect::MAX_GRAINS];
        assert!(effect.trigger_grain(&settings));
        let grain = effect.grains[0];
        let capacity = effect.grain_buffer.capacity();
        let newest = effect.grain_buffer.write_pos() as isize - 1;
        assert_eq!(
            grain.start,
            (newest - 4800).rem_euclid(capacity as isize) as usize
        );
        assert!((grain.pitch_ratio - 2.0).abs() < 1e-6);
        assert!((0.7..=1.0).contains(&grain.amplitude));
        assert!((0.0..=1.0).contains(&grain.pan));
        assert!(!grain.reverse);

        let reversed = GrainSettings {
            reverse: 1.0,
            frozen: true,
            ..settings
        };
        assert!(effect.trigger_grain(&reversed));
        let grain = effect.grains[1];
        assert!(grain.reverse);
        assert!(grain.start < capacity);
    }

    #[test]
    fn dry_mix_passes_input() {
        let mut effect = effect_with(&[
            (GranularEffect::MIX_ID, 0.0),
            (GranularEffect::FEEDBACK_ID, 0.8),
            (GranularEffect::SHIMMER_ID, 0.5),
        ]);
        for block in 0..50 {
            let input = input_block(block);
            let mut buffer = input.clone();
            effect.process(&mut buffer, &EffectTime::default());
            for (output, input) in buffer.iter().zip(input.iter()) {
                assert!((output - input).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn wet_mix_outputs_grains_only() {
        let parameters = [
            (GranularEffect::FEEDBACK_ID, 0.5),
            (GranularEffect::SHIMMER_ID, 0.3),
            (GranularEffect::BLUR_ID, 0.2),
        ];
        let mut wet_effect = effect_with(&parameters);
        wet_effect
            .parameter_handle()
            .set(GranularEffect::MIX_ID, 1.0)
            .unwrap();
        wet_effect.initialize(SAMPLE_RATE, 2, BLOCK_SIZE).unwrap();
        let mut half_effect = effect_with(&parameters);
        half_effect
            .parameter_handle()
            .set(GranularEffect::MIX_ID, 0.5)
            .unwrap();
        half_effect.initialize(SAMPLE_RATE, 2, BLOCK_SIZE).unwrap();

        let mut max_wet = 0.0f32;
        for block in 0..100 {
            let input = input_block(block);
            let mut wet = input.clone();
            wet_effect.process(&mut wet, &EffectTime::default());
            let mut half = input.clone();
            half_effect.process(&mut half, &EffectTime::default());
            for ((wet, half), dry) in wet.iter().zip(half.iter()).zip(input.iter()) {
                // half = 0.5 * dry + 0.5 * wet
                assert!((wet - (2.0 * half - dry)).abs() < 1e-4, "{wet} {half} {dry}");
                max_wet = max_wet.max(wet.abs());
            }
        }
        assert!(max_wet > 0.0);
    }

    #[test]
    fn bypass_leaves_buffers_untouched() {
        let mut effect = effect_with(&[(GranularEffect::FEEDBACK_ID, 0.7)]);
        let visualizer = effect.visualizer();
        let _ = process_blocks(&mut effect, 30);
        assert!(visualizer.grain_activity() > 0.0);

        let grain_frames = effect.grain_buffer.frames().to_vec();
        let shimmer_frames = effect.shimmer_buffer.frames().to_vec();
        let write_pos = effect.grain_buffer.write_pos();
        let grains = effect.grains;

        let handle = effect.parameter_handle();
        handle.set(GranularEffect::BYPASS_ID, 1.0).unwrap();
        for block in 30..40 {
            let input = input_block(block);
            let mut buffer = input.clone();
            effect.process(&mut buffer, &EffectTime::default());
            assert_eq!(buffer, input);
        }
        assert_eq!(visualizer.grain_activity(), 0.0);
        handle.set(GranularEffect::BYPASS_ID, 0.0).unwrap();

        assert_eq!(effect.grain_buffer.frames(), grain_frames.as_slice());
        assert_eq!(effect.shimmer_buffer.frames(), shimmer_frames.as_slice());
        assert_eq!(effect.grain_buffer.write_pos(), write_pos);
        assert_eq!(effect.grains, grains);
    }

    #[test]
    fn freeze_snapshots_history() {
        let mut effect = effect_with(&[(GranularEffect::FEEDBACK_ID, 0.0)]);
        let visualizer = effect.visualizer();
        let _ = process_blocks(&mut effect, 20);
        let history = effect.grain_buffer.frames().to_vec();
        let write_pos = effect.grain_buffer.write_pos();

        effect
            .parameter_handle()
            .set(GranularEffect::FREEZE_ID, 1.0)
            .unwrap();
        let rendered = process_blocks(&mut effect, 20);
        assert!(visualizer.is_frozen());
        assert_eq!(effect.freeze_buffer.frames(), history.as_slice());
        assert_eq!(effect.grain_buffer.frames(), history.as_slice());
        assert!(rendered.iter().all(|sample| sample.is_finite()));
        // the write cursor keeps running while frozen
        let capacity = effect.grain_buffer.capacity();
        let frozen_write_pos = (write_pos + 20 * BLOCK_SIZE) % capacity;
        assert_eq!(effect.grain_buffer.write_pos(), frozen_write_pos);

        effect
            .parameter_handle()
            .set(GranularEffect::FREEZE_ID, 0.0)
            .unwrap();
        let _ = process_blocks(&mut effect, 1);
        assert!(!visualizer.is_frozen());
        assert_eq!(
            effect.grain_buffer.write_pos(),
            (frozen_write_pos + BLOCK_SIZE) % capacity
        );
        // writing resumes at the advanced cursor
        assert_eq!(
            &effect.grain_buffer.frames()[write_pos..frozen_write_pos],
            &history[write_pos..frozen_write_pos]
        );
        assert_ne!(
            &effect.grain_buffer.frames()[frozen_write_pos..frozen_write_pos + BLOCK_SIZE],
            &history[frozen_write_pos..frozen_write_pos + BLOCK_SIZE]
        );
    }

    #[test]
    fn shimmer_ring_idles_without_shimmer() {
        let mut effect = effect_with(&[(GranularEffect::FEEDBACK_ID, 0.5)]);
        let _ = process_blocks(&mut effect, 20);
        assert_eq!(effect.shimmer_buffer.write_pos(), 0);
        assert!(effect.shimmer_buffer.frames().iter().all(|f| *f == [0.0, 0.0]));

        effect
            .parameter_handle()
            .set(GranularEffect::SHIMMER_ID, 0.5)
            .unwrap();
        let _ = process_blocks(&mut effect, 20);
        assert_ne!(effect.shimmer_buffer.write_pos(), 0);
        assert!(effect.shimmer_buffer.frames().iter().any(|f| *f != [0.0, 0.0]));
    }

    #[test]
    fn initialize_resets_state_but_keeps_parameters() {
        let mut effect = effect_with(&[(GranularEffect::PITCH_ID, 7.0)]);
        let _ = process_blocks(&mut effect, 30);
        assert!(effect.active_grain_count() > 0);
        assert!(effect.grain_buffer.frames().iter().any(|f| *f != [0.0, 0.0]));

        effect.initialize(44100, 2, 512).unwrap();
        assert_eq!(effect.active_grain_count(), 0);
        assert_eq!(effect.grain_buffer.capacity(), 88200);
        assert_eq!(effect.grain_buffer.write_pos(), 0);
        assert!(effect.grain_buffer.frames().iter().all(|f| *f == [0.0, 0.0]));
        assert!(effect.shimmer_buffer.frames().iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(effect.trigger_counter, 0);
        assert_eq!(
            effect.parameter_handle().value(GranularEffect::PITCH_ID).unwrap(),
            7.0
        );
        assert_eq!(effect.parameters.pitch.value(), 7.0);
    }

    #[test]
    fn output_gain_and_level() {
        let mut effect = effect_with(&[
            (GranularEffect::MIX_ID, 0.0),
            (GranularEffect::OUTPUT_ID, -6.0),
        ]);
        let visualizer = effect.visualizer();
        let input = input_block(0);
        let mut buffer = input.clone();
        effect.process(&mut buffer, &EffectTime::default());
        let gain = db_to_linear(-6.0);
        for (output, input) in buffer.iter().zip(input.iter()) {
            assert!((output - input * gain).abs() < 1e-5);
        }
        assert!((visualizer.output_level() - max_abs_sample(&buffer)).abs() < 1e-6);
    }

    #[test]
    fn seeded_effects_are_deterministic() {
        let parameters = [
            (GranularEffect::PITCH_SCATTER_ID, 1.0),
            (GranularEffect::REVERSE_ID, 0.5),
            (GranularEffect::SPREAD_ID, 0.8),
        ];
        let mut first = effect_with(&parameters);
        let mut second = effect_with(&parameters);
        assert_eq!(process_blocks(&mut first, 30), process_blocks(&mut second, 30));
    }
}
