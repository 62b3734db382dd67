use std::path::PathBuf;

use thiserror::Error;

/// Problems with a requested or negotiated stream configuration.
///
/// These are fatal at initialization time and are never silently defaulted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported channel count: {0} (expected 1..={max})", max = crate::format::MAX_CHANNELS)]
    UnsupportedChannels(u16),

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("invalid frames per callback: {0}")]
    InvalidFrameCount(u32),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Typed sample access failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("sample index {index} out of range for buffer of {len} samples")]
    OutOfRange { index: usize, len: usize },

    #[error("encoded sample is {actual} bytes, expected {expected}")]
    WidthMismatch { expected: usize, actual: usize },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type CodecResult<T> = Result<T, CodecError>;
