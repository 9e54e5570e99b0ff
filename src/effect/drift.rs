use std::sync::Arc;

use four_cc::FourCC;

use crate::{
    effect::{Effect, EffectTime},
    parameter::{
        BooleanParameter, BooleanParameterValue, EnumParameter, EnumParameterValue,
        FloatParameter, FloatParameterValue, IntegerParameter, IntegerParameterValue,
        ParameterHandle, ParameterValueUpdate, SmoothedParameterValue,
    },
    utils::{
        dsp::{
            allpass::AllpassBank,
            delay::CircularBuffer,
            envelope::EnvelopeFollower,
            filters::svf::{SvfCoefficients, SvfFilter, SvfFilterType},
            lfo::Lfo,
            saturation::soft_saturate,
            tempo::NoteDivision,
        },
        InterleavedBufferMut, LinearSmoothedValue, SmoothedValue,
    },
    visualizer::{DelayVisualizer, MAX_TAP_LEVELS},
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

/// Gain of the ducked wet signal for the given input envelope and duck amount.
///
/// Envelopes at or above 0.5 reduce the gain by the full duck amount. The result is always
/// in range `0..=1` for amounts in range `0..=1`.
#[inline]
pub fn duck_gain(envelope: f32, amount: f32) -> f32 {
    1.0 - (envelope.max(0.0) * 2.0).min(1.0) * amount
}

// -------------------------------------------------------------------------------------------------

// Parameter values of the drift delay effect, as seen by the audio thread.
struct DriftParameters {
    time: FloatParameterValue,
    sync: BooleanParameterValue,
    division: EnumParameterValue<NoteDivision>,
    feedback: SmoothedParameterValue,
    duck: FloatParameterValue,
    taps: IntegerParameterValue,
    spread: SmoothedParameterValue,
    mix: SmoothedParameterValue,
    grit: SmoothedParameterValue,
    age: SmoothedParameterValue,
    diffuse: SmoothedParameterValue,
    bypass: BooleanParameterValue,
}

impl DriftParameters {
    fn new() -> Self {
        let smoothed_percent = |id: FourCC, name: &'static str, default: f32| {
            SmoothedParameterValue::<LinearSmoothedValue>::from_description(
                FloatParameter::new(id, name, 0.0..=1.0, default).with_percent_display(),
            )
        };
        Self {
            time: FloatParameterValue::from_description(
                FloatParameter::new(
                    DriftDelayEffect::TIME_ID,
                    "Time",
                    10.0..=2000.0,
                    400.0, //
                )
                .with_unit("ms"),
            ),
            sync: BooleanParameterValue::from_description(BooleanParameter::new(
                DriftDelayEffect::SYNC_ID,
                "Sync",
                false,
            )),
            division: EnumParameterValue::from_description(EnumParameter::new(
                DriftDelayEffect::DIVISION_ID,
                "Division",
                NoteDivision::Quarter,
            )),
            feedback: smoothed_percent(DriftDelayEffect::FEEDBACK_ID, "Feedback", 0.4),
            duck: FloatParameterValue::from_description(
                FloatParameter::new(DriftDelayEffect::DUCK_ID, "Duck", 0.0..=1.0, 0.0)
                    .with_percent_display(),
            ),
            taps: IntegerParameterValue::from_description(IntegerParameter::new(
                DriftDelayEffect::TAPS_ID,
                "Taps",
                1..=MAX_TAP_LEVELS as i32,
                2,
            )),
            spread: smoothed_percent(DriftDelayEffect::SPREAD_ID, "Spread", 0.5),
            mix: smoothed_percent(DriftDelayEffect::MIX_ID, "Mix", 0.35),
            grit: smoothed_percent(DriftDelayEffect::GRIT_ID, "Grit", 0.0),
            age: smoothed_percent(DriftDelayEffect::AGE_ID, "Age", 0.3),
            diffuse: smoothed_percent(DriftDelayEffect::DIFFUSE_ID, "Diffuse", 0.0),
            bypass: BooleanParameterValue::from_description(BooleanParameter::new(
                DriftDelayEffect::BYPASS_ID,
                "Bypass",
                false,
            )),
        }
    }

    fn descriptions(&self) -> Vec<&dyn ClonableParameter> {
        vec![
            self.time.description(),
            self.sync.description(),
            self.division.description(),
            self.feedback.description(),
            self.duck.description(),
            self.taps.description(),
            self.spread.description(),
            self.mix.description(),
            self.grit.description(),
            self.age.description(),
            self.diffuse.description(),
            self.bypass.description(),
        ]
    }

    fn smoothed_values(&mut self) -> [&mut SmoothedParameterValue; 6] {
        [
            &mut self.feedback,
            &mut self.spread,
            &mut self.mix,
            &mut self.grit,
            &mut self.age,
            &mut self.diffuse,
        ]
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        for value in self.smoothed_values() {
            value.set_sample_rate(sample_rate);
        }
    }

    fn skip_ramps(&mut self) {
        for value in self.smoothed_values() {
            value.skip_ramp();
        }
    }

    // Set a plain value, as read from the parameter store. Returns false for unknown ids.
    fn set_plain_value(&mut self, id: FourCC, value: f32) -> bool {
        match id {
            _ if id == DriftDelayEffect::TIME_ID => self.time.set_value_clamped(value),
            _ if id == DriftDelayEffect::SYNC_ID => self.sync.set_value(value >= 0.5),
            _ if id == DriftDelayEffect::DIVISION_ID => self
                .division
                .set_value(NoteDivision::from_index(value.max(0.0).round() as usize)),
            _ if id == DriftDelayEffect::FEEDBACK_ID => {
                self.feedback.set_target_value_clamped(value)
            }
            _ if id == DriftDelayEffect::DUCK_ID => self.duck.set_value_clamped(value),
            _ if id == DriftDelayEffect::TAPS_ID => {
                self.taps.set_value_clamped(value.round() as i32)
            }
            _ if id == DriftDelayEffect::SPREAD_ID => self.spread.set_target_value_clamped(value),
            _ if id == DriftDelayEffect::MIX_ID => self.mix.set_target_value_clamped(value),
            _ if id == DriftDelayEffect::GRIT_ID => self.grit.set_target_value_clamped(value),
            _ if id == DriftDelayEffect::AGE_ID => self.age.set_target_value_clamped(value),
            _ if id == DriftDelayEffect::DIFFUSE_ID => {
                self.diffuse.set_target_value_clamped(value)
            }
            _ if id == DriftDelayEffect::BYPASS_ID => self.bypass.set_value(value >= 0.5),
            _ => return false,
        }
        true
    }

    // Apply an update and return the resulting plain value. Returns None for unknown ids.
    fn apply_update(&mut self, id: FourCC, update: &ParameterValueUpdate) -> Option<f32> {
        let flag = |value: bool| if value { 1.0 } else { 0.0 };
        let value = match id {
            _ if id == DriftDelayEffect::TIME_ID => {
                self.time.apply_update(update);
                self.time.value()
            }
            _ if id == DriftDelayEffect::SYNC_ID => {
                self.sync.apply_update(update);
                flag(self.sync.value())
            }
            _ if id == DriftDelayEffect::DIVISION_ID => {
                // invalid division indices fall back to a quarter note
                let index = match update {
                    ParameterValueUpdate::Raw(raw) => raw.downcast_ref::<usize>(),
                    ParameterValueUpdate::Normalized(_) => None,
                };
                match index {
                    Some(index) => self.division.set_value(NoteDivision::from_index(*index)),
                    None => self.division.apply_update(update),
                }
                self.division.index() as f32
            }
            _ if id == DriftDelayEffect::FEEDBACK_ID => {
                self.feedback.apply_update(update);
                self.feedback.target_value()
            }
            _ if id == DriftDelayEffect::DUCK_ID => {
                self.duck.apply_update(update);
                self.duck.value()
            }
            _ if id == DriftDelayEffect::TAPS_ID => {
                self.taps.apply_update(update);
                self.taps.value() as f32
            }
            _ if id == DriftDelayEffect::SPREAD_ID => {
                self.spread.apply_update(update);
                self.spread.target_value()
            }
            _ if id == DriftDelayEffect::MIX_ID => {
                self.mix.apply_update(update);
                self.mix.target_value()
            }
            _ if id == DriftDelayEffect::GRIT_ID => {
                self.grit.apply_update(update);
                self.grit.target_value()
            }
            _ if id == DriftDelayEffect::AGE_ID => {
                self.age.apply_update(update);
                self.age.target_value()
            }
            _ if id == DriftDelayEffect::DIFFUSE_ID => {
                self.diffuse.apply_update(update);
                self.diffuse.target_value()
            }
            _ if id == DriftDelayEffect::BYPASS_ID => {
                self.bypass.apply_update(update);
                flag(self.bypass.value())
            }
            _ => return None,
        };
        Some(value)
    }
}

// -------------------------------------------------------------------------------------------------

/// A tempo aware, stereo multi-tap delay with slowly drifting delay times.
///
/// Up to four taps read from a shared delay line. Later taps are quieter and get progressively
/// darker, dirtier and more diffuse. Three slow LFOs modulate all tap times, and the wet signal
/// gets ducked by the level of the input.
///
/// The first tap's signal is the only one which is fed back into the delay line.
pub struct DriftDelayEffect {
    sample_rate: u32,
    parameters: DriftParameters,
    store: ParameterHandle,
    visualizer: Arc<DelayVisualizer>,
    delay_time: LinearSmoothedValue,
    delay_buffer: CircularBuffer<2>,
    age_states: [[f32; 2]; MAX_TAP_LEVELS],
    diffusion: AllpassBank<2>,
    drift_lfos: [Lfo; 3],
    envelope: EnvelopeFollower,
    highpass_coefficients: SvfCoefficients,
    highpass: SvfFilter<2>,
    lowpass_coefficients: SvfCoefficients,
    lowpass: SvfFilter<2>,
}

impl DriftDelayEffect {
    pub const EFFECT_NAME: &str = "Drift Delay";
    pub const TIME_ID: FourCC = FourCC(*b"time");
    pub const SYNC_ID: FourCC = FourCC(*b"sync");
    pub const DIVISION_ID: FourCC = FourCC(*b"div_");
    pub const FEEDBACK_ID: FourCC = FourCC(*b"fdbk");
    pub const DUCK_ID: FourCC = FourCC(*b"duck");
    pub const TAPS_ID: FourCC = FourCC(*b"taps");
    pub const SPREAD_ID: FourCC = FourCC(*b"sprd");
    pub const MIX_ID: FourCC = FourCC(*b"mix_");
    pub const GRIT_ID: FourCC = FourCC(*b"grit");
    pub const AGE_ID: FourCC = FourCC(*b"age_");
    pub const DIFFUSE_ID: FourCC = FourCC(*b"difs");
    pub const BYPASS_ID: FourCC = FourCC(*b"byps");

    /// Delay line length in seconds: the longest tap (4 × 2000 ms) at maximum positive drift
    /// (+15.2%) needs 9.22 s.
    pub const MAX_DELAY_SECONDS: f32 = 10.0;

    const DELAY_TIME_RAMP: f32 = 0.05;
    const DUCK_ATTACK: f32 = 0.005;
    const DUCK_RELEASE: f32 = 0.2;
    const DRIFT_RATES: [f64; 3] = [0.13, 0.089, 0.21];
    const DRIFT_PHASES: [f64; 3] = [0.0, 0.33, 0.66];
    const DRIFT_WEIGHTS: [f32; 3] = [0.5, 0.3, 0.2];
    const DRIFT_DEPTH: f32 = 0.08;
    const HIGHPASS_CUTOFF: f32 = 60.0;
    const LOWPASS_CUTOFF: f32 = 12000.0;
    const MAX_FEEDBACK: f32 = 0.99;

    /// Creates a new `DriftDelayEffect` with default parameter values.
    pub fn new() -> Self {
        let parameters = DriftParameters::new();
        let store = ParameterHandle::new(&parameters.descriptions());
        let delay_time = LinearSmoothedValue::with_ramp_time(
            parameters.time.value(),
            Self::DELAY_TIME_RAMP,
            0,
        );
        Self {
            sample_rate: 0,
            parameters,
            store,
            visualizer: Arc::new(DelayVisualizer::new()),
            delay_time,
            delay_buffer: CircularBuffer::default(),
            age_states: [[0.0; 2]; MAX_TAP_LEVELS],
            diffusion: AllpassBank::new(),
            drift_lfos: Default::default(),
            envelope: EnvelopeFollower::new(0, Self::DUCK_ATTACK, Self::DUCK_RELEASE),
            highpass_coefficients: SvfCoefficients::default(),
            highpass: SvfFilter::new(),
            lowpass_coefficients: SvfCoefficients::default(),
            lowpass: SvfFilter::new(),
        }
    }

    /// Shared telemetry of this effect instance.
    pub fn visualizer(&self) -> Arc<DelayVisualizer> {
        Arc::clone(&self.visualizer)
    }

    fn pull_parameters(&mut self) {
        for (id, value) in self.store.values() {
            let known = self.parameters.set_plain_value(id, value);
            debug_assert!(known, "Unexpected parameter '{id}' in parameter store");
        }
    }

    // Base delay time in ms: either the free running time or the synced note division.
    fn base_time_ms(&self, time: &EffectTime) -> f32 {
        if self.parameters.sync.value() {
            self.parameters.division.value().time_ms(time.bpm) as f32
        } else {
            self.parameters.time.value()
        }
    }

    // Delay lengths are clamped, so reads never overtake the write cursor.
    #[inline]
    fn read_delayed(&self, delay_in_frames: f32) -> [f32; 2] {
        let max_delay = (self.delay_buffer.capacity() - 2) as f32;
        let delay = delay_in_frames.clamp(1.0, max_delay);
        self.delay_buffer.read_interpolated(delay - 1.0)
    }
}

impl Default for DriftDelayEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DriftDelayEffect {
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

        let delay_buffer_size = (Self::MAX_DELAY_SECONDS * sample_rate as f32) as usize;
        self.delay_buffer = CircularBuffer::new(delay_buffer_size.max(4));

        self.drift_lfos = std::array::from_fn(|index| {
            Lfo::new(
                sample_rate,
                Self::DRIFT_RATES[index],
                Self::DRIFT_PHASES[index],
            )
        });
        self.envelope = EnvelopeFollower::new(sample_rate, Self::DUCK_ATTACK, Self::DUCK_RELEASE);

        self.highpass_coefficients = SvfCoefficients::new(
            SvfFilterType::Highpass,
            sample_rate,
            Self::HIGHPASS_CUTOFF,
            SvfCoefficients::DEFAULT_Q,
        )?;
        self.lowpass_coefficients = SvfCoefficients::new(
            SvfFilterType::Lowpass,
            sample_rate,
            Self::LOWPASS_CUTOFF,
            SvfCoefficients::DEFAULT_Q,
        )?;

        self.parameters.set_sample_rate(sample_rate);
        self.delay_time.set_sample_rate(sample_rate);
        self.pull_parameters();
        self.parameters.skip_ramps();
        self.delay_time.init(self.base_time_ms(&EffectTime::default()));

        self.reset();

        log::debug!(
            "{}: initialized with {sample_rate} Hz and {} frames delay line",
            self.name(),
            self.delay_buffer.capacity()
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.delay_buffer.clear();
        self.age_states = [[0.0; 2]; MAX_TAP_LEVELS];
        self.diffusion.reset();
        for lfo in &mut self.drift_lfos {
            lfo.reset();
        }
        self.envelope.reset(0.0);
        self.highpass.reset();
        self.lowpass.reset();
    }

    fn process(&mut self, output: &mut [f32], time: &EffectTime) {
        if self.sample_rate == 0 {
            return;
        }
        self.pull_parameters();

        if self.parameters.bypass.value() {
            self.visualizer.clear();
            return;
        }

        self.delay_time.set_target(self.base_time_ms(time));
        let duck = self.parameters.duck.value();
        let num_taps = (self.parameters.taps.value() as usize).clamp(1, MAX_TAP_LEVELS);
        let frames_per_ms = self.sample_rate as f32 / 1000.0;

        let mut input_level = 0.0f32;
        let mut drift = 0.0f32;
        let mut tap_levels = [0.0f32; MAX_TAP_LEVELS];

        for frame in output.as_frames_mut::<2>() {
            let dry = *frame;
            let base_delay = self.delay_time.next() * frames_per_ms;
            let feedback = self.parameters.feedback.next_value();
            let spread = self.parameters.spread.next_value();
            let mix = self.parameters.mix.next_value();
            let grit = self.parameters.grit.next_value();
            let age = self.parameters.age.next_value();
            let diffuse = self.parameters.diffuse.next_value();

            let input_peak = dry[0].abs().max(dry[1].abs());
            input_level = input_level.max(input_peak);
            let wet_gain = duck_gain(self.envelope.process(input_peak), duck);

            drift = 0.0;
            for (lfo, weight) in self.drift_lfos.iter_mut().zip(Self::DRIFT_WEIGHTS) {
                drift += lfo.next() * weight;
            }

            let mut wet = [0.0f32; 2];
            for tap in 0..num_taps {
                let tap_index = tap as f32;
                let modulation = 1.0 + drift * Self::DRIFT_DEPTH * (1.0 + tap_index * 0.3);
                let mut sample = self.read_delayed(base_delay * (tap_index + 1.0) * modulation);

                // later taps get more character
                let character = 0.25 + (tap_index / 3.0) * 0.75;
                let tap_age = age * character;
                let tap_grit = grit * character;
                let tap_diffuse = diffuse * character;

                if tap_age > 0.001 {
                    let coefficient = 1.0 - tap_age * 0.7;
                    for (state, value) in self.age_states[tap].iter_mut().zip(sample.iter_mut()) {
                        *state += coefficient * (*value - *state);
                        *value = *state;
                    }
                }
                for value in sample.iter_mut() {
                    *value = soft_saturate(*value, tap_grit);
                }
                if tap_diffuse > 0.001 {
                    if let Some(stage) = self.diffusion.stage_mut(tap) {
                        sample = stage.process(sample, 0.5 + tap_diffuse * 0.35);
                    }
                }

                let amplitude = (0.7 + feedback * 0.25).powi(tap as i32);
                let reduction = spread * (tap_index / 3.0);
                let (pan_left, pan_right) = if tap % 2 == 0 {
                    (1.0, 1.0 - reduction)
                } else {
                    (1.0 - reduction, 1.0)
                };
                let left = sample[0] * amplitude * pan_left;
                let right = sample[1] * amplitude * pan_right;
                tap_levels[tap] = tap_levels[tap].max(left.abs()).max(right.abs());
                wet[0] += left;
                wet[1] += right;
            }

            wet = self.highpass.process_frame(&self.highpass_coefficients, wet);
            wet = self.lowpass.process_frame(&self.lowpass_coefficients, wet);
            for sample in wet.iter_mut() {
                *sample *= wet_gain;
            }

            // regenerate from an undamped tap
            let feedback_tap = self.read_delayed(base_delay * (1.0 + drift * Self::DRIFT_DEPTH));
            let regeneration = feedback.min(Self::MAX_FEEDBACK);
            self.delay_buffer.write([
                dry[0] + soft_saturate(feedback_tap[0], grit * 0.5) * regeneration,
                dry[1] + soft_saturate(feedback_tap[1], grit * 0.5) * regeneration,
            ]);

            for ((out, dry), wet) in frame.iter_mut().zip(dry).zip(wet) {
                *out = dry * (1.0 - mix) + wet * mix;
            }
        }

        self.visualizer
            .publish(input_level, drift, &tap_levels[..num_taps]);
    }

    fn process_tail(&self) -> Option<usize> {
        Some((Self::MAX_DELAY_SECONDS * self.sample_rate as f32) as usize)
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
