use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tonescope_core::config::StreamConfig;
use tonescope_core::format::{channel_layout_name, validate_channels};
use tonescope_core::{ConfigError, SampleFormat};

/// Rates probed inside a device's supported range.
pub const COMMON_SAMPLE_RATES: [u32; 11] = [
    8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000,
];

/// Formats tried, in order, when the requested one is unavailable and
/// conversion is allowed.
const FORMAT_PREFERENCE: [SampleFormat; 6] = [
    SampleFormat::F32,
    SampleFormat::S16,
    SampleFormat::U16,
    SampleFormat::S32,
    SampleFormat::U8,
    SampleFormat::S8,
];

/// What the session asks the host for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub channels: u16,
    pub frames_per_callback: u32,
    pub allow_rate_change: bool,
    pub allow_format_change: bool,
}

impl StreamRequest {
    pub fn new(sample_rate: u32, format: SampleFormat, channels: u16, frames_per_callback: u32) -> Self {
        Self {
            sample_rate,
            format,
            channels,
            frames_per_callback,
            allow_rate_change: true,
            allow_format_change: false,
        }
    }

    pub fn allow_rate_change(mut self, allow: bool) -> Self {
        self.allow_rate_change = allow;
        self
    }

    pub fn allow_format_change(mut self, allow: bool) -> Self {
        self.allow_format_change = allow;
        self
    }
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for StreamRequest {
    fn from(config: &StreamConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            format: config.format,
            channels: config.channels,
            frames_per_callback: config.frames_per_callback,
            allow_rate_change: config.allow_rate_change,
            allow_format_change: config.allow_format_change,
        }
    }
}

/// The parameters the fill routine actually runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSpec {
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub channels: u16,
    pub frames_per_callback: u32,
    /// Raw value written for silence, in the encoding of `format`.
    pub silence: f64,
}

impl DeviceSpec {
    pub fn new(sample_rate: u32, format: SampleFormat, channels: u16, frames_per_callback: u32) -> Self {
        Self {
            sample_rate,
            format,
            channels,
            frames_per_callback,
            silence: format.default_silence(),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.byte_width()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Size of one full callback buffer.
    pub fn callback_bytes(&self) -> usize {
        self.bytes_per_frame() * self.frames_per_callback as usize
    }

    /// Wall-clock budget of one callback.
    pub fn callback_period(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.frames_per_callback) / f64::from(self.sample_rate))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.frames_per_callback == 0 {
            return Err(ConfigError::InvalidFrameCount(self.frames_per_callback));
        }
        validate_channels(self.channels)?;
        Ok(())
    }

    pub fn log_spec(&self, prefix: &str) {
        log::info!("{prefix}Sample rate : {} Hz", self.sample_rate);
        log::info!("{prefix}Format      : {}", self.format);
        log::info!(
            "{prefix}Channels    : {} ({})",
            channel_layout_name(self.channels),
            self.channels
        );
        log::info!("{prefix}Silence     : {}", self.silence);
        log::info!("{prefix}Frames      : {}", self.frames_per_callback);
        log::info!("{prefix}Size        : {} bytes", self.callback_bytes());
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, {} frames, format: {}",
            self.channels, self.sample_rate, self.frames_per_callback, self.format
        )
    }
}

/// What a device reports it can do, restricted to the formats we can encode.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,

    pub supported_sample_rates: Vec<u32>,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub default_sample_rate: u32,

    pub supported_channels: Vec<u16>,
    pub default_channels: u16,

    pub supported_formats: Vec<SampleFormat>,
    pub default_format: Option<SampleFormat>,

    /// Inclusive frames-per-callback range, when the device reports one.
    pub buffer_size_range: Option<(u32, u32)>,
}

impl DeviceCapabilities {
    /// A device that accepts anything the engine can produce.
    pub fn permissive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported_sample_rates: COMMON_SAMPLE_RATES.to_vec(),
            min_sample_rate: 1,
            max_sample_rate: 384_000,
            default_sample_rate: 48_000,
            supported_channels: (1..=tonescope_core::format::MAX_CHANNELS).collect(),
            default_channels: 2,
            supported_formats: SampleFormat::ALL.to_vec(),
            default_format: Some(SampleFormat::F32),
            buffer_size_range: None,
        }
    }
}

impl fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}-{}Hz, channels {:?}, formats {:?}]",
            self.name,
            self.min_sample_rate,
            self.max_sample_rate,
            self.supported_channels,
            self.supported_formats
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum NegotiationError {
    #[error("sample rate {requested} not supported (device range {min}-{max} Hz)")]
    SampleRateNotSupported { requested: u32, min: u32, max: u32 },

    #[error("channel count {requested} not supported. Available: {available:?}")]
    ChannelsNotSupported { requested: u16, available: Vec<u16> },

    #[error("sample format {requested} not supported. Available: {available:?}")]
    FormatNotSupported {
        requested: SampleFormat,
        available: Vec<SampleFormat>,
    },

    #[error("no compatible configuration found for device")]
    NoCompatibleConfiguration,
}

pub type NegotiationResult<T> = Result<T, NegotiationError>;

/// Result of negotiation plus which requested values survived unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiatedConfig {
    pub spec: DeviceSpec,
    pub sample_rate_matched: bool,
    pub format_matched: bool,
    pub buffer_size_matched: bool,
}

impl NegotiatedConfig {
    pub fn exact(&self) -> bool {
        self.sample_rate_matched && self.format_matched && self.buffer_size_matched
    }
}

pub struct ConfigNegotiator;

impl ConfigNegotiator {
    pub fn negotiate(
        capabilities: &DeviceCapabilities,
        request: &StreamRequest,
    ) -> NegotiationResult<NegotiatedConfig> {
        let sample_rate = Self::negotiate_sample_rate(capabilities, request)?;
        let channels = Self::negotiate_channels(capabilities, request)?;
        let format = Self::negotiate_format(capabilities, request)?;
        let frames_per_callback = Self::negotiate_buffer_size(capabilities, request);

        Ok(NegotiatedConfig {
            spec: DeviceSpec::new(sample_rate, format, channels, frames_per_callback),
            sample_rate_matched: sample_rate == request.sample_rate,
            format_matched: format == request.format,
            buffer_size_matched: frames_per_callback == request.frames_per_callback,
        })
    }

    fn negotiate_sample_rate(
        capabilities: &DeviceCapabilities,
        request: &StreamRequest,
    ) -> NegotiationResult<u32> {
        if Self::is_sample_rate_supported(capabilities, request.sample_rate) {
            return Ok(request.sample_rate);
        }

        if !request.allow_rate_change {
            return Err(NegotiationError::SampleRateNotSupported {
                requested: request.sample_rate,
                min: capabilities.min_sample_rate,
                max: capabilities.max_sample_rate,
            });
        }

        Self::find_closest_sample_rate(capabilities, request.sample_rate)
            .ok_or(NegotiationError::NoCompatibleConfiguration)
    }

    fn is_sample_rate_supported(capabilities: &DeviceCapabilities, rate: u32) -> bool {
        rate > 0 && rate >= capabilities.min_sample_rate && rate <= capabilities.max_sample_rate
    }

    /// Closest probed rate, or the target clamped into the device range when
    /// nothing was probed.
    pub fn find_closest_sample_rate(capabilities: &DeviceCapabilities, target: u32) -> Option<u32> {
        if capabilities.min_sample_rate > capabilities.max_sample_rate {
            return None;
        }

        if capabilities.supported_sample_rates.is_empty() {
            return Some(target.clamp(capabilities.min_sample_rate, capabilities.max_sample_rate))
                .filter(|&rate| rate > 0);
        }

        capabilities
            .supported_sample_rates
            .iter()
            .min_by_key(|&&rate| (i64::from(rate) - i64::from(target)).abs())
            .copied()
    }

    fn negotiate_channels(
        capabilities: &DeviceCapabilities,
        request: &StreamRequest,
    ) -> NegotiationResult<u16> {
        if validate_channels(request.channels).is_ok()
            && capabilities.supported_channels.contains(&request.channels)
        {
            return Ok(request.channels);
        }

        Err(NegotiationError::ChannelsNotSupported {
            requested: request.channels,
            available: capabilities.supported_channels.clone(),
        })
    }

    fn negotiate_format(
        capabilities: &DeviceCapabilities,
        request: &StreamRequest,
    ) -> NegotiationResult<SampleFormat> {
        if capabilities.supported_formats.contains(&request.format) {
            return Ok(request.format);
        }

        if !request.allow_format_change {
            return Err(NegotiationError::FormatNotSupported {
                requested: request.format,
                available: capabilities.supported_formats.clone(),
            });
        }

        if let Some(default) = capabilities.default_format {
            if capabilities.supported_formats.contains(&default) {
                return Ok(default);
            }
        }

        FORMAT_PREFERENCE
            .iter()
            .copied()
            .find(|format| capabilities.supported_formats.contains(format))
            .ok_or(NegotiationError::NoCompatibleConfiguration)
    }

    fn negotiate_buffer_size(capabilities: &DeviceCapabilities, request: &StreamRequest) -> u32 {
        match capabilities.buffer_size_range {
            Some((min, max)) if min <= max => request.frames_per_callback.clamp(min, max),
            _ => request.frames_per_callback,
        }
    }

    pub fn calculate_latency_ms(sample_rate: u32, frames_per_callback: u32) -> f32 {
        (frames_per_callback as f32 / sample_rate as f32) * 1000.0
    }
}
