//! Output through the platform audio API via cpal.
//!
//! The stream is built with `build_output_stream_raw`, so the fill routine
//! receives the device buffer as plain bytes in the negotiated format.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig, SupportedBufferSize};
use tonescope_core::{ConfigError, SampleFormat};

use crate::audio_device::host::AudioHost;
use crate::audio_device::negotiation::{
    COMMON_SAMPLE_RATES, ConfigNegotiator, DeviceCapabilities, DeviceSpec, StreamRequest,
};
use crate::error::{DeviceError, DeviceResult, Diagnostic, EngineResult};
use crate::rt_processing::callback::CallbackSlot;

pub fn format_from_cpal(format: cpal::SampleFormat) -> Result<SampleFormat, ConfigError> {
    match format {
        cpal::SampleFormat::I8 => Ok(SampleFormat::S8),
        cpal::SampleFormat::U8 => Ok(SampleFormat::U8),
        cpal::SampleFormat::I16 => Ok(SampleFormat::S16),
        cpal::SampleFormat::U16 => Ok(SampleFormat::U16),
        cpal::SampleFormat::I32 => Ok(SampleFormat::S32),
        cpal::SampleFormat::F32 => Ok(SampleFormat::F32),
        other => Err(ConfigError::UnsupportedFormat(format!("{other:?}"))),
    }
}

pub fn format_to_cpal(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::S8 => cpal::SampleFormat::I8,
        SampleFormat::U8 => cpal::SampleFormat::U8,
        SampleFormat::S16 => cpal::SampleFormat::I16,
        SampleFormat::U16 => cpal::SampleFormat::U16,
        SampleFormat::S32 => cpal::SampleFormat::I32,
        SampleFormat::F32 => cpal::SampleFormat::F32,
    }
}

/// Default output device of the default cpal host.
pub struct CpalHost {
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
}

impl CpalHost {
    pub fn new() -> Self {
        Self {
            device: None,
            stream: None,
        }
    }

    fn output_device(&mut self) -> DeviceResult<&cpal::Device> {
        if self.device.is_none() {
            let host = cpal::default_host();
            log::info!("CpalHost: using host {:?}", host.id());
            let device = host.default_output_device().ok_or(DeviceError::NoOutputDevice)?;
            self.device = Some(device);
        }
        self.device.as_ref().ok_or(DeviceError::NoOutputDevice)
    }

    /// Collect what the device supports, keeping only formats we can encode.
    pub fn query_capabilities(device: &cpal::Device) -> DeviceResult<DeviceCapabilities> {
        let name = device
            .name()
            .map_err(|e| DeviceError::Query(format!("Failed to get device name: {e}")))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| DeviceError::Query(format!("Failed to get default config: {e}")))?;

        let mut sample_rates = Vec::new();
        let mut min_sample_rate = u32::MAX;
        let mut max_sample_rate = 0u32;
        let mut channels = Vec::new();
        let mut formats = Vec::new();
        let mut buffer_size_range: Option<(u32, u32)> = None;

        let configs = device
            .supported_output_configs()
            .map_err(|e| DeviceError::Query(format!("Failed to get supported configs: {e}")))?;

        for range in configs {
            let format = match format_from_cpal(range.sample_format()) {
                Ok(format) => format,
                Err(_) => continue,
            };

            let min_sr = range.min_sample_rate().0;
            let max_sr = range.max_sample_rate().0;
            min_sample_rate = min_sample_rate.min(min_sr);
            max_sample_rate = max_sample_rate.max(max_sr);
            sample_rates.extend(
                COMMON_SAMPLE_RATES
                    .iter()
                    .copied()
                    .filter(|rate| (min_sr..=max_sr).contains(rate)),
            );

            if !channels.contains(&range.channels()) {
                channels.push(range.channels());
            }
            if !formats.contains(&format) {
                formats.push(format);
            }

            if let SupportedBufferSize::Range { min, max } = range.buffer_size() {
                buffer_size_range = Some(match buffer_size_range {
                    Some((lo, hi)) => (lo.min(*min), hi.max(*max)),
                    None => (*min, *max),
                });
            }
        }

        if formats.is_empty() {
            return Err(DeviceError::Query(format!(
                "{name} offers no supported sample format"
            )));
        }

        sample_rates.sort_unstable();
        sample_rates.dedup();
        channels.sort_unstable();

        Ok(DeviceCapabilities {
            name,
            supported_sample_rates: sample_rates,
            min_sample_rate,
            max_sample_rate,
            default_sample_rate: default_config.sample_rate().0,
            supported_channels: channels,
            default_channels: default_config.channels(),
            supported_formats: formats,
            default_format: format_from_cpal(default_config.sample_format()).ok(),
            buffer_size_range,
        })
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for CpalHost {
    fn negotiate(&mut self, request: &StreamRequest) -> EngineResult<DeviceSpec> {
        let device = self.output_device()?;
        let capabilities = Self::query_capabilities(device)?;
        log::info!("CpalHost: {capabilities}");

        let negotiated = ConfigNegotiator::negotiate(&capabilities, request)?;
        if !negotiated.exact() {
            log::warn!(
                "CpalHost: device changed the stream: requested {} Hz {} x{}, got {}",
                request.sample_rate,
                request.format,
                request.frames_per_callback,
                negotiated.spec
            );
        }
        Ok(negotiated.spec)
    }

    fn open(&mut self, spec: &DeviceSpec, slot: CallbackSlot) -> DeviceResult<()> {
        let device = self.output_device()?;
        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size: BufferSize::Fixed(spec.frames_per_callback),
        };

        let error_slot = slot.clone();
        let stream = device
            .build_output_stream_raw(
                &config,
                format_to_cpal(spec.format),
                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                    slot.process_realtime(data.bytes_mut());
                },
                move |err| {
                    error_slot.report(Diagnostic::Stream(err.to_string()));
                },
                None,
            )
            .map_err(|e| DeviceError::Open(e.to_string()))?;

        // Some backends start streams immediately; the fill engine also
        // emits silence while the session is paused
        if let Err(e) = stream.pause() {
            log::warn!("CpalHost: could not pause new stream: {e}");
        }
        self.stream = Some(stream);
        log::info!("CpalHost: opened stream {spec}");
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> DeviceResult<()> {
        let stream = self.stream.as_ref().ok_or(DeviceError::NotOpen)?;
        if paused {
            stream.pause().map_err(|e| DeviceError::Pause(e.to_string()))
        } else {
            stream.play().map_err(|e| DeviceError::Play(e.to_string()))
        }
    }

    fn close(&mut self) {
        // Dropping the stream joins the platform callback thread
        if self.stream.take().is_some() {
            log::info!("CpalHost: stream closed");
        }
    }
}
