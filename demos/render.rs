//! Renders a WAV file through one of drift's effects, writing the result into a new WAV file
//! and logging the effect's visualizer values at UI refresh rate.

use std::{io, path::PathBuf, sync::Arc};

use arg::{parse_args, Args};
use four_cc::FourCC;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use drift::{
    effects::{DriftDelayEffect, GranularEffect},
    DelayVisualizer, EffectHost, Error, GranularVisualizer, ParameterHandle, Transport,
};

// -------------------------------------------------------------------------------------------------

#[cfg(all(debug_assertions, feature = "assert-allocs"))]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Info
};

const DEFAULT_BLOCK_SIZE: usize = 512;
// Length of silence rendered after the input for effects with unknown tails.
const DEFAULT_TAIL_SECONDS: f64 = 2.0;
// Visualizer polling rate.
const SNAPSHOT_RATE: f64 = 30.0;

// -------------------------------------------------------------------------------------------------

/// Program arguments.
#[derive(Args, Debug)]
struct Arguments {
    #[arg(short = "e", long = "effect")]
    /// Effect to apply: \"granular\" or \"drift\" (default).
    effect: Option<String>,
    #[arg(short = "p", long = "params")]
    /// Comma separated parameter values, e.g. \"taps=3,fdbk=0.6,div_=1/8D\".
    params: Option<String>,
    #[arg(short = "t", long = "bpm")]
    /// Host tempo in beats per minute for tempo synced effects.
    bpm: Option<f64>,
    #[arg(short = "b", long = "block-size")]
    /// Processing block size in frames.
    block_size: Option<usize>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    log_level: Option<log::Level>,
    /// Input WAV file.
    input: PathBuf,
    /// Output WAV file.
    output: PathBuf,
}

// -------------------------------------------------------------------------------------------------

enum Meter {
    Granular(Arc<GranularVisualizer>),
    Delay(Arc<DelayVisualizer>),
}

impl Meter {
    fn log(&self, seconds: f64) {
        match self {
            Meter::Granular(visualizer) => {
                let snapshot = visualizer.snapshot();
                log::info!(
                    "{seconds:7.3}s grains: {:.2} pitch: {:+.1} st level: {:.3}{}",
                    snapshot.grain_activity,
                    snapshot.current_pitch,
                    snapshot.output_level,
                    if snapshot.is_frozen { " [frozen]" } else { "" }
                );
            }
            Meter::Delay(visualizer) => {
                let snapshot = visualizer.snapshot();
                log::info!(
                    "{seconds:7.3}s input: {:.3} drift: {:+.3} taps: {:.3?}",
                    snapshot.input_level,
                    snapshot.duck_envelope,
                    snapshot.tap_levels
                );
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn wav_error(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(err) => Error::IoError(err),
        err => Error::IoError(io::Error::other(err)),
    }
}

fn parse_parameter_id(id: &str) -> Result<FourCC, Error> {
    let bytes = <[u8; 4]>::try_from(id.as_bytes()).map_err(|_| {
        Error::ParameterError(format!("Parameter ids must have 4 characters, got '{id}'"))
    })?;
    Ok(FourCC(bytes))
}

fn apply_parameters(handle: &ParameterHandle, params: &str) -> Result<(), Error> {
    for assignment in params.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, value) = assignment.split_once('=').ok_or_else(|| {
            Error::ParameterError(format!("Expected 'id=value', got '{assignment}'"))
        })?;
        let id = parse_parameter_id(id.trim())?;
        let value = value.trim();
        match value.parse::<f32>() {
            Ok(plain_value) => handle.set(id, plain_value)?,
            Err(_) => handle.set_string(id, value)?,
        }
        log::debug!("Set parameter '{id}' to {}", handle.value_string(id)?);
    }
    Ok(())
}

// Read a mono or stereo WAV file into an interleaved stereo buffer.
fn read_stereo_wav(path: &PathBuf) -> Result<(Vec<f32>, u32), Error> {
    let mut reader = WavReader::open(path).map_err(wav_error)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_error)?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(wav_error)?
        }
    };
    let stereo = match spec.channels {
        1 => samples.iter().flat_map(|sample| [*sample, *sample]).collect(),
        2 => samples,
        channels => return Err(Error::UnsupportedChannelLayout(channels as usize)),
    };
    Ok((stereo, spec.sample_rate))
}

fn write_stereo_wav(path: &PathBuf, samples: &[f32], sample_rate: u32) -> Result<(), Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).map_err(wav_error)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    let args = parse_args::<Arguments>();

    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        .init()
        .expect("Failed to set logger");

    // create the effect and its host
    let (mut host, meter) = match args.effect.as_deref().unwrap_or("drift") {
        "granular" => {
            let effect = GranularEffect::new();
            let meter = Meter::Granular(effect.visualizer());
            (EffectHost::new(Box::new(effect)), meter)
        }
        "drift" => {
            let effect = DriftDelayEffect::new();
            let meter = Meter::Delay(effect.visualizer());
            (EffectHost::new(Box::new(effect)), meter)
        }
        other => {
            return Err(Error::ParameterError(format!(
                "Unknown effect '{other}': expected 'granular' or 'drift'"
            )))
        }
    };
    if let Some(params) = &args.params {
        apply_parameters(&host.parameter_handle(), params)?;
    }

    // read input and append the effect's tail
    let (mut samples, sample_rate) = read_stereo_wav(&args.input)?;
    let block_size = args.block_size.unwrap_or(DEFAULT_BLOCK_SIZE).max(1);
    host.prepare(sample_rate, block_size)?;
    let tail_seconds = host.tail_length_seconds().unwrap_or(DEFAULT_TAIL_SECONDS);
    let tail_frames = (tail_seconds * sample_rate as f64) as usize;
    samples.resize(samples.len() + tail_frames * 2, 0.0);
    log::info!(
        "Rendering {:.2}s of audio with '{}'...",
        samples.len() as f64 / 2.0 / sample_rate as f64,
        host.name()
    );

    // process
    let snapshot_frames = ((sample_rate as f64 / SNAPSHOT_RATE) as usize).max(1);
    let mut frames_until_snapshot = snapshot_frames;
    let mut position = 0_u64;
    for block in samples.chunks_mut(block_size * 2) {
        let transport = Transport::new(args.bpm, position);
        host.process_interleaved(block, &transport);
        let frames = block.len() / 2;
        position += frames as u64;
        if frames >= frames_until_snapshot {
            meter.log(position as f64 / sample_rate as f64);
            frames_until_snapshot = snapshot_frames;
        } else {
            frames_until_snapshot -= frames;
        }
    }
    host.release();

    write_stereo_wav(&args.output, &samples, sample_rate)?;
    log::info!("Wrote '{}'", args.output.display());
    Ok(())
}
