use crate::{
    effect::{Effect, EffectTime},
    parameter::ParameterHandle,
    utils::buffer::{stereo_interleaved_to_planar, stereo_planar_to_interleaved},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Transport information of the audio host, queried once per processed block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transport {
    /// Host tempo in beats per minute, if known. Missing or non positive tempos are treated as
    /// 120 BPM by tempo synced effects.
    pub bpm: Option<f64>,
    /// Position of the block's first frame in the host's timeline.
    pub position_in_frames: u64,
}

impl Transport {
    pub fn new(bpm: Option<f64>, position_in_frames: u64) -> Self {
        Self {
            bpm,
            position_in_frames,
        }
    }

    fn effect_time(&self) -> EffectTime {
        EffectTime::new(self.position_in_frames, self.bpm)
    }
}

// -------------------------------------------------------------------------------------------------

/// Processing state of an [`EffectHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Not yet prepared or released: processing passes audio through.
    Unprepared,
    /// Buffers are sized and cleared, no block got processed yet.
    Prepared,
    /// At least one block got processed since the last prepare.
    Running,
}

// -------------------------------------------------------------------------------------------------

/// Drives a single stereo [`Effect`] the way an audio plugin host does.
///
/// The host negotiates the channel layout, (re)initializes the effect when the audio
/// configuration changes, splits blocks larger than the prepared maximum block size into chunks
/// and converts planar audio to the interleaved layout effects process.
pub struct EffectHost {
    effect: Box<dyn Effect>,
    state: HostState,
    sample_rate: u32,
    max_frames: usize,
    scratch_buffer: Vec<f32>,
}

impl EffectHost {
    /// Number of input and output channels the host processes.
    pub const CHANNEL_COUNT: usize = 2;

    pub fn new(effect: Box<dyn Effect>) -> Self {
        Self {
            effect,
            state: HostState::Unprepared,
            sample_rate: 0,
            max_frames: 0,
            scratch_buffer: Vec::new(),
        }
    }

    /// The hosted effect's name.
    pub fn name(&self) -> &'static str {
        self.effect.name()
    }

    /// Access the hosted effect.
    pub fn effect(&self) -> &dyn Effect {
        self.effect.as_ref()
    }

    /// Mutable access to the hosted effect, e.g. to apply parameter updates.
    pub fn effect_mut(&mut self) -> &mut dyn Effect {
        self.effect.as_mut()
    }

    /// A clone of the hosted effect's parameter store.
    pub fn parameter_handle(&self) -> ParameterHandle {
        self.effect.parameter_handle()
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// The prepared sample rate, or 0 when unprepared.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The prepared maximum block size in frames, or 0 when unprepared.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Test if the given input and output channel layout can be processed.
    pub fn is_layout_supported(&self, input_channels: usize, output_channels: usize) -> bool {
        input_channels == output_channels && self.effect.supports_channel_count(output_channels)
    }

    /// Initialize the effect for the given audio configuration and clear all its buffers.
    ///
    /// Can be called at any time to change the configuration. On errors, the host stays
    /// unprepared and passes audio through.
    pub fn prepare(&mut self, sample_rate: u32, max_frames: usize) -> Result<(), Error> {
        if self.state == HostState::Running {
            self.effect.process_stopped();
        }
        self.state = HostState::Unprepared;
        self.sample_rate = 0;
        self.max_frames = 0;

        if let Err(err) = self
            .effect
            .initialize(sample_rate, Self::CHANNEL_COUNT, max_frames)
        {
            log::warn!("Failed to prepare effect '{}': {err}", self.name());
            return Err(err);
        }
        self.scratch_buffer = vec![0.0; max_frames * Self::CHANNEL_COUNT];
        self.sample_rate = sample_rate;
        self.max_frames = max_frames;
        self.state = HostState::Prepared;

        log::info!(
            "Prepared effect '{}' with {sample_rate} Hz and {max_frames} frames",
            self.name()
        );
        Ok(())
    }

    /// Stop processing and free the host's buffers.
    pub fn release(&mut self) {
        if self.state == HostState::Running {
            self.effect.process_stopped();
        }
        self.state = HostState::Unprepared;
        self.sample_rate = 0;
        self.max_frames = 0;
        self.scratch_buffer = Vec::new();
    }

    /// Length of the effect's audible tail in seconds, if known.
    pub fn tail_length_seconds(&self) -> Option<f64> {
        if self.sample_rate == 0 {
            return None;
        }
        self.effect
            .process_tail()
            .map(|frames| frames as f64 / self.sample_rate as f64)
    }

    /// Process an interleaved stereo buffer in place.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], transport: &Transport) {
        if self.state == HostState::Unprepared {
            return;
        }
        debug_assert!(
            buffer.len() % Self::CHANNEL_COUNT == 0,
            "Expecting interleaved stereo buffers"
        );
        self.start_processing();

        let mut time = transport.effect_time();
        for chunk in buffer.chunks_mut(self.max_frames * Self::CHANNEL_COUNT) {
            self.effect.process(chunk, &time);
            time = time.advanced(chunk.len() / Self::CHANNEL_COUNT);
        }
    }

    /// Process a planar stereo buffer pair in place.
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32], transport: &Transport) {
        if self.state == HostState::Unprepared {
            return;
        }
        debug_assert_eq!(left.len(), right.len(), "Planar channel sizes mismatch");
        self.start_processing();

        let mut time = transport.effect_time();
        for (left, right) in left
            .chunks_mut(self.max_frames)
            .zip(right.chunks_mut(self.max_frames))
        {
            let frames = left.len().min(right.len());
            let interleaved = &mut self.scratch_buffer[..frames * Self::CHANNEL_COUNT];
            stereo_planar_to_interleaved(&left[..frames], &right[..frames], interleaved);
            self.effect.process(interleaved, &time);
            stereo_interleaved_to_planar(interleaved, &mut left[..frames], &mut right[..frames]);
            time = time.advanced(frames);
        }
    }

    fn start_processing(&mut self) {
        if self.state == HostState::Prepared {
            self.effect.process_started();
            self.state = HostState::Running;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use four_cc::FourCC;

    use super::*;
    use crate::{
        effects::{DriftDelayEffect, GranularEffect},
        parameter::ParameterValueUpdate,
        ClonableParameter,
    };

    #[derive(Default)]
    struct Calls {
        initialized: AtomicUsize,
        started: AtomicUsize,
        stopped: AtomicUsize,
        processed_frames: AtomicUsize,
        max_block_frames: AtomicUsize,
    }

    // Records all calls and halves the signal.
    struct RecordingEffect {
        calls: Arc<Calls>,
        store: ParameterHandle,
        next_position: u64,
    }

    impl RecordingEffect {
        fn new(calls: Arc<Calls>) -> Self {
            Self {
                calls,
                store: ParameterHandle::new(&[]),
                next_position: 0,
            }
        }
    }

    impl Effect for RecordingEffect {
        fn name(&self) -> &'static str {
            "Recording"
        }
        fn parameters(&self) -> Vec<&dyn ClonableParameter> {
            vec![]
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
            if channel_count != 2 {
                return Err(Error::UnsupportedChannelLayout(channel_count));
            }
            if sample_rate == 0 {
                return Err(Error::InvalidSampleRate(sample_rate));
            }
            if max_frames == 0 {
                return Err(Error::InvalidBlockSize(max_frames));
            }
            self.calls.initialized.fetch_add(1, Ordering::Relaxed);
            self.next_position = 0;
            Ok(())
        }
        fn reset(&mut self) {}
        fn process_started(&mut self) {
            self.calls.started.fetch_add(1, Ordering::Relaxed);
        }
        fn process_stopped(&mut self) {
            self.calls.stopped.fetch_add(1, Ordering::Relaxed);
        }
        fn process(&mut self, output: &mut [f32], time: &EffectTime) {
            assert_eq!(time.position_in_frames, self.next_position);
            let frames = output.len() / 2;
            self.next_position += frames as u64;
            self.calls
                .processed_frames
                .fetch_add(frames, Ordering::Relaxed);
            self.calls
                .max_block_frames
                .fetch_max(frames, Ordering::Relaxed);
            for sample in output.iter_mut() {
                *sample *= 0.5;
            }
        }
        fn process_parameter_update(
            &mut self,
            id: FourCC,
            _value: &ParameterValueUpdate,
        ) -> Result<(), Error> {
            Err(Error::ParameterError(format!("Unknown parameter: '{id}'")))
        }
    }

    fn test_signal(frames: usize) -> Vec<f32> {
        (0..frames * 2)
            .map(|index| ((index as f32) * 0.01).sin() * 0.5)
            .collect()
    }

    #[test]
    fn layout_negotiation() {
        let host = EffectHost::new(Box::new(GranularEffect::with_seed(1)));
        assert!(host.is_layout_supported(2, 2));
        assert!(!host.is_layout_supported(1, 1));
        assert!(!host.is_layout_supported(1, 2));
        assert!(!host.is_layout_supported(2, 6));
        assert!(!host.is_layout_supported(6, 6));
    }

    #[test]
    fn unprepared_hosts_pass_through() {
        let calls = Arc::new(Calls::default());
        let mut host = EffectHost::new(Box::new(RecordingEffect::new(calls.clone())));
        let input = test_signal(100);
        let mut buffer = input.clone();
        host.process_interleaved(&mut buffer, &Transport::default());
        assert_eq!(buffer, input);

        assert!(host.prepare(0, 64).is_err());
        assert!(host.prepare(48000, 0).is_err());
        assert_eq!(host.state(), HostState::Unprepared);
        host.process_interleaved(&mut buffer, &Transport::default());
        assert_eq!(buffer, input);
        assert_eq!(calls.processed_frames.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn state_transitions() {
        let calls = Arc::new(Calls::default());
        let mut host = EffectHost::new(Box::new(RecordingEffect::new(calls.clone())));
        assert_eq!(host.state(), HostState::Unprepared);

        host.prepare(44100, 64).unwrap();
        assert_eq!(host.state(), HostState::Prepared);
        assert_eq!(calls.started.load(Ordering::Relaxed), 0);

        let mut buffer = test_signal(64);
        host.process_interleaved(&mut buffer, &Transport::default());
        host.process_interleaved(&mut buffer, &Transport::new(None, 64));
        assert_eq!(host.state(), HostState::Running);
        assert_eq!(calls.started.load(Ordering::Relaxed), 1);

        // reconfiguration re-enters the prepared state
        host.prepare(48000, 128).unwrap();
        assert_eq!(host.state(), HostState::Prepared);
        assert_eq!(calls.stopped.load(Ordering::Relaxed), 1);
        assert_eq!(calls.initialized.load(Ordering::Relaxed), 2);

        host.process_interleaved(&mut buffer, &Transport::default());
        assert_eq!(calls.started.load(Ordering::Relaxed), 2);

        host.release();
        assert_eq!(host.state(), HostState::Unprepared);
        assert_eq!(calls.stopped.load(Ordering::Relaxed), 2);
        host.release();
        assert_eq!(calls.stopped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn large_blocks_are_chunked() {
        let calls = Arc::new(Calls::default());
        let mut host = EffectHost::new(Box::new(RecordingEffect::new(calls.clone())));
        host.prepare(48000, 100).unwrap();

        let input = test_signal(350);
        let mut buffer = input.clone();
        host.process_interleaved(&mut buffer, &Transport::default());
        assert_eq!(calls.processed_frames.load(Ordering::Relaxed), 350);
        assert_eq!(calls.max_block_frames.load(Ordering::Relaxed), 100);
        assert!(buffer.iter().zip(&input).all(|(out, input)| *out == input * 0.5));

        let mut left = vec![0.5; 250];
        let mut right = vec![-0.25; 250];
        host.process_planar(&mut left, &mut right, &Transport::new(None, 350));
        assert_eq!(calls.processed_frames.load(Ordering::Relaxed), 600);
        assert_eq!(calls.max_block_frames.load(Ordering::Relaxed), 100);
        assert!(left.iter().all(|sample| *sample == 0.25));
        assert!(right.iter().all(|sample| *sample == -0.125));
    }

    #[test]
    fn planar_and_interleaved_processing_match() {
        let mut interleaved_host = EffectHost::new(Box::new(DriftDelayEffect::new()));
        let mut planar_host = EffectHost::new(Box::new(DriftDelayEffect::new()));
        for host in [&mut interleaved_host, &mut planar_host] {
            host.parameter_handle()
                .set(DriftDelayEffect::TIME_ID, 20.0)
                .unwrap();
            host.prepare(48000, 256).unwrap();
        }

        let transport = Transport::new(Some(98.0), 0);
        for _ in 0..8 {
            let mut interleaved = test_signal(1000);
            let (mut left, mut right): (Vec<f32>, Vec<f32>) = interleaved
                .chunks_exact(2)
                .map(|frame| (frame[0], frame[1]))
                .unzip();
            interleaved_host.process_interleaved(&mut interleaved, &transport);
            planar_host.process_planar(&mut left, &mut right, &transport);
            for (frame, (l, r)) in interleaved.chunks_exact(2).zip(left.iter().zip(&right)) {
                assert_eq!(frame[0], *l);
                assert_eq!(frame[1], *r);
            }
        }
    }

    #[test]
    fn tail_lengths() {
        let mut host = EffectHost::new(Box::new(DriftDelayEffect::new()));
        assert_eq!(host.tail_length_seconds(), None);
        host.prepare(48000, 512).unwrap();
        assert_eq!(host.tail_length_seconds(), Some(10.0));

        let mut host = EffectHost::new(Box::new(GranularEffect::with_seed(7)));
        host.prepare(48000, 512).unwrap();
        assert_eq!(host.tail_length_seconds(), None);
    }
}
