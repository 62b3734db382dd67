//! Session configuration schema and loader.
//!
//! Stored as JSON. Every section has defaults, so a missing file or a partial
//! file yields a usable configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::format::{SampleFormat, validate_channels};
use crate::waveform::{Waveform, WaveformGenerator};

pub const DEFAULT_FREQUENCY: i32 = 440;
pub const DEFAULT_AMPLITUDE: i32 = 120;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_FRAMES_PER_CALLBACK: u32 = 1024;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonescopeConfig {
    pub wave: WaveConfig,
    pub stream: StreamConfig,
    pub playback: PlaybackConfig,
    pub display: DisplayConfig,
}

/// Initial generator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub frequency: i32,
    pub amplitude: i32,
    /// Radians
    pub phase: f64,
    pub waveform: Waveform,
}

/// Stream parameters requested from the audio host.
///
/// The host may hand back something different; see the backend negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub channels: u16,
    pub frames_per_callback: u32,
    /// Let the host pick a different sample rate than requested.
    pub allow_rate_change: bool,
    /// Let the host pick a different sample format than requested.
    pub allow_format_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub volume: f32,
    /// Silence gate. `None` means one second worth of frames at the
    /// negotiated sample rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_budget: Option<i64>,
    pub autoplay: bool,
}

/// Renderer-side settings for the terminal front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub frame_rate_hz: u32,
    /// Characters per trace line
    pub columns: usize,
    /// Log a trace line every this many display frames
    pub trace_every: u32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            amplitude: DEFAULT_AMPLITUDE,
            phase: 0.0,
            waveform: Waveform::Sine,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            format: SampleFormat::U8,
            channels: DEFAULT_CHANNELS,
            frames_per_callback: DEFAULT_FRAMES_PER_CALLBACK,
            allow_rate_change: true,
            allow_format_change: false,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            length_budget: None,
            autoplay: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            columns: 64,
            trace_every: 30,
        }
    }
}

impl WaveConfig {
    pub fn generator(&self) -> WaveformGenerator {
        WaveformGenerator::new(self.frequency, self.amplitude, self.waveform, self.phase)
    }
}

impl StreamConfig {
    /// Reject values no host could satisfy.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.frames_per_callback == 0 {
            return Err(ConfigError::InvalidFrameCount(self.frames_per_callback));
        }
        validate_channels(self.channels)?;
        Ok(())
    }
}

impl TonescopeConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: TonescopeConfig = serde_json::from_str(json)?;
        config.stream.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Load configuration from a JSON file.
///
/// A missing file is not an error: defaults are returned. A file that exists
/// but cannot be read or parsed is.
pub fn load_config(path: &Path) -> ConfigResult<TonescopeConfig> {
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::warn!("load_config: Config file doesn't exist, using defaults");
        return Ok(TonescopeConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = TonescopeConfig::from_json_str(&contents)?;
    log::info!(
        "load_config: {} {} Hz, {} ch {} @ {} Hz",
        config.wave.waveform,
        config.wave.frequency,
        config.stream.channels,
        config.stream.format,
        config.stream.sample_rate
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TonescopeConfig::default();
        assert_eq!(config.wave.frequency, 440);
        assert_eq!(config.wave.amplitude, 120);
        assert_eq!(config.wave.waveform, Waveform::Sine);
        assert_eq!(config.stream.sample_rate, 44_100);
        assert_eq!(config.stream.format, SampleFormat::U8);
        assert_eq!(config.stream.channels, 2);
        assert_eq!(config.stream.frames_per_callback, 1024);
        assert_eq!(config.playback.volume, 1.0);
        assert!(config.stream.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "wave": { "frequency": 220, "waveform": "triangle" },
            "stream": { "format": "s16", "channels": 4 }
        }"#;
        let config = TonescopeConfig::from_json_str(json).unwrap();
        assert_eq!(config.wave.frequency, 220);
        assert_eq!(config.wave.amplitude, 120);
        assert_eq!(config.wave.waveform, Waveform::Triangle);
        assert_eq!(config.stream.format, SampleFormat::S16);
        assert_eq!(config.stream.channels, 4);
        assert_eq!(config.stream.sample_rate, 44_100);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let json = r#"{ "stream": { "format": "s24" } }"#;
        assert!(matches!(
            TonescopeConfig::from_json_str(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_stream_values_are_rejected() {
        let json = r#"{ "stream": { "channels": 0 } }"#;
        assert!(matches!(
            TonescopeConfig::from_json_str(json),
            Err(ConfigError::UnsupportedChannels(0))
        ));

        let json = r#"{ "stream": { "sample_rate": 0 } }"#;
        assert!(matches!(
            TonescopeConfig::from_json_str(json),
            Err(ConfigError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = TonescopeConfig::default();
        config.playback.length_budget = Some(0);
        config.wave.phase = 0.5;
        let json = config.to_json_string().unwrap();
        assert_eq!(TonescopeConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("tonescope-config-that-does-not-exist.json");
        assert_eq!(load_config(&path).unwrap(), TonescopeConfig::default());
    }

    #[test]
    fn test_generator_from_wave_config() {
        let wave = WaveConfig {
            frequency: 100,
            amplitude: 10,
            phase: 0.0,
            waveform: Waveform::Square,
        };
        let generator = wave.generator();
        assert_eq!(generator.frequency(), 100);
        assert_eq!(generator.waveform(), Waveform::Square);
        assert!((generator.period() - 0.01).abs() < 1e-12);
    }
}
