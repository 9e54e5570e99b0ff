use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by drift.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    ParameterError(String),
    UnsupportedChannelLayout(usize),
    InvalidSampleRate(u32),
    InvalidBlockSize(usize),
    StateError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::UnsupportedChannelLayout(channel_count) => {
                write!(
                    f,
                    "Unsupported channel layout: expected stereo, got {channel_count} channels"
                )
            }
            Self::InvalidSampleRate(sample_rate) => {
                write!(f, "Invalid sample rate: {sample_rate}")
            }
            Self::InvalidBlockSize(block_size) => write!(f, "Invalid block size: {block_size}"),
            Self::StateError(str) => write!(f, "Invalid parameter state: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}
