//! Signal model shared by the tonescope backend and front end: the waveform
//! generator, the PCM sample codec and the session configuration.

pub mod config;
pub mod error;
pub mod format;
pub mod waveform;

pub use config::{TonescopeConfig, load_config};
pub use error::{CodecError, ConfigError};
pub use format::{SampleCodec, SampleFormat};
pub use waveform::{Waveform, WaveformGenerator};
