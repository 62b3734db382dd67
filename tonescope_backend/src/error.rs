use thiserror::Error;
use tonescope_core::{CodecError, ConfigError};

use crate::audio_device::negotiation::NegotiationError;
use crate::session::EngineState;

/// Failures talking to the output device. Never retried internally.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no output device available")]
    NoOutputDevice,

    #[error("device query failed: {0}")]
    Query(String),

    #[error("failed to open output stream: {0}")]
    Open(String),

    #[error("failed to start stream: {0}")]
    Play(String),

    #[error("failed to pause stream: {0}")]
    Pause(String),

    #[error("device is not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("control queue is full, command dropped")]
    CommandQueueFull,
}

/// Realtime faults, reported from the audio thread after the fact.
#[derive(Debug, Clone, Error)]
pub enum Diagnostic {
    #[error("fill callback fell back to silence: {0}")]
    FillFailed(#[from] CodecError),

    #[error("output stream error: {0}")]
    Stream(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
pub type DeviceResult<T> = Result<T, DeviceError>;
