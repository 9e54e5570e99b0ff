use four_cc::FourCC;

use crate::{
    parameter::{ParameterHandle, ParameterValueUpdate},
    ClonableParameter, Error,
};

// -------------------------------------------------------------------------------------------------

pub mod drift;
pub mod granular;

// -------------------------------------------------------------------------------------------------

/// Frame and host transport time reference for an audio effect's process function.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectTime {
    /// Position of the first frame of the processed block, counted from the start of processing.
    pub position_in_frames: u64,
    /// Host tempo in beats per minute, if the host provides one. Tempo synced effects fall back
    /// to [`DEFAULT_BPM`](crate::utils::dsp::tempo::DEFAULT_BPM) for missing or invalid tempos.
    pub bpm: Option<f64>,
}

impl EffectTime {
    pub fn new(position_in_frames: u64, bpm: Option<f64>) -> Self {
        Self {
            position_in_frames,
            bpm,
        }
    }

    /// Time reference for a block that starts `frames` frames after this one.
    pub fn advanced(&self, frames: usize) -> Self {
        Self {
            position_in_frames: self.position_in_frames + frames as u64,
            bpm: self.bpm,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Effects manipulate stereo audio samples in `f32` format and can be `Send` and `Sync`ed across
/// threads. Buffers are processed in-place in the audio real-time thread.
///
/// Each effect owns a [`ParameterHandle`], a lock-free store of all its plain parameter values.
/// Clones of the handle can be passed to UIs, automation or state persistence layers, which then
/// may change parameter values from any thread. Effects pull the latest values from the handle
/// once at the start of each processed block, and smooth them internally where necessary.
///
/// If you need to pass shared data from the effect to UIs (e.g. levels, activity meters), use
/// the effect's visualizer, which publishes its values via atomics.
///
/// NB: all `process_XXX` functions are called in realtime audio threads, so they must not
/// block! All other functions are called in the main thread to initialize the effect.
pub trait Effect: Send + Sync + 'static {
    /// A unique, static name for the effect, used for logging or in UIs.
    fn name(&self) -> &'static str;

    /// Returns a list of parameter descriptors for this effect.
    ///
    /// This can be used by UIs or automation systems to query available parameters of a specific
    /// effect. This method may only be called on non-real-time threads.
    fn parameters(&self) -> Vec<&dyn ClonableParameter>;

    /// Returns a clone of the effect's shared parameter value store.
    fn parameter_handle(&self) -> ParameterHandle;

    /// Test if the effect can process the given number of channels. All effects in this crate
    /// only support stereo I/O.
    fn supports_channel_count(&self, channel_count: usize) -> bool {
        channel_count == 2
    }

    /// Initializes the effect with the audio output's properties.
    ///
    /// This method is called by the host before the effect is used, and again whenever the
    /// audio configuration changes. It runs on a non-real-time thread, so it's safe to perform
    /// allocations (e.g., for delay buffers) or other setup tasks. All audio buffers get cleared
    /// and all counters get reset. Parameter values are kept.
    ///
    /// If an error is returned, the effect must not be processed.
    fn initialize(
        &mut self,
        sample_rate: u32,
        channel_count: usize,
        max_frames: usize,
    ) -> Result<(), Error>;

    /// Clear all audio buffers and internal DSP states, without reallocating them.
    fn reset(&mut self);

    /// Called in the real-time thread before audio processing starts.
    ///
    /// Like `process`, this method must not block, allocate memory, or do other time-consuming tasks.
    fn process_started(&mut self) {}

    /// Called in the real-time thread after processing stopped.
    ///
    /// Like `process`, this method must not block, allocate memory, or do other time-consuming tasks.
    fn process_stopped(&mut self) {}

    /// Processes an interleaved stereo audio buffer in-place, applying the effect.
    ///
    /// This method is called repeatedly on the real-time audio thread. To avoid audio glitches,
    /// it must not block, allocate memory, or perform other time-consuming operations. The
    /// buffer never holds more frames than the `max_frames` the effect got initialized with.
    ///
    /// Use [`InterleavedBufferMut`](crate::utils::buffer::InterleavedBufferMut) to get channel/frame
    /// representations of the given output buffer as needed.
    fn process(&mut self, output: &mut [f32], time: &EffectTime);

    /// Returns the number of audible sample frames this effect will produce, after it received
    /// silence.
    /// - `None`: means the tail length is unknown.
    /// - `Some(X)`: means that the effect will produce at most X sample frames of audible audio.
    fn process_tail(&self) -> Option<usize> {
        None
    }

    /// Handles a parameter update in the real-time thread.
    ///
    /// The implementation applies the raw or normalized value and writes the resulting plain
    /// value back to its parameter store, so the update is visible to all handle clones.
    ///
    /// Like `process`, this method must not block, allocate memory, or do other time-consuming
    /// tasks. Errors are only allocated for invalid updates.
    fn process_parameter_update(
        &mut self,
        id: FourCC,
        value: &ParameterValueUpdate,
    ) -> Result<(), Error>;
}

// -------------------------------------------------------------------------------------------------
