//! PCM sample encodings.
//!
//! A closed set of six formats selected at runtime by the device negotiation.
//! `SampleFormat` dispatches onto the `PcmSample` trait, which is implemented
//! once per numeric type, so adding a format is a compile error until every
//! match handles it. Samples are stored in native byte order, which is what
//! host audio APIs hand out.

use std::fmt;
use std::str::FromStr;

use dasp::Sample;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult, ConfigError};

/// Upper bound on channel count accepted by the engine.
pub const MAX_CHANNELS: u16 = 8;

/// Largest `byte_width` of any supported format.
pub const MAX_SAMPLE_BYTES: usize = 4;

/// One numeric sample representation.
///
/// `from_f64` rounds to nearest and saturates at the type's range; NaN maps
/// to zero, matching Rust's float-to-int `as` conversion.
pub trait PcmSample: Sample + Copy {
    const WIDTH: usize;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn write_ne(self, out: &mut [u8]);
    fn read_ne(bytes: &[u8]) -> Self;

    /// Equilibrium value of the encoding as a plain number.
    fn equilibrium() -> f64 {
        <Self as Sample>::EQUILIBRIUM.to_f64()
    }
}

macro_rules! impl_pcm_int {
    ($($ty:ty),*) => {
        $(
            impl PcmSample for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value.round() as $ty
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    f64::from(self)
                }

                #[inline]
                fn write_ne(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_pcm_int!(i8, u8, i16, u16, i32);

impl PcmSample for f32 {
    const WIDTH: usize = 4;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn write_ne(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_ne_bytes());
    }

    #[inline]
    fn read_ne(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        f32::from_ne_bytes(raw)
    }
}

/// Runtime tag for a device sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S8,
    #[default]
    U8,
    S16,
    U16,
    S32,
    F32,
}

/// Static facts about a `SampleFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    pub kind: SampleFormat,
    pub byte_width: usize,
    pub is_signed: bool,
    pub is_float: bool,
}

#[inline]
fn slot(len_bytes: usize, index: usize, width: usize) -> CodecResult<std::ops::Range<usize>> {
    let len = len_bytes / width;
    if index >= len {
        return Err(CodecError::OutOfRange { index, len });
    }
    let start = index * width;
    Ok(start..start + width)
}

#[inline]
fn encode_as<T: PcmSample>(buffer: &mut [u8], index: usize, value: f64) -> CodecResult<()> {
    let range = slot(buffer.len(), index, T::WIDTH)?;
    T::from_f64(value).write_ne(&mut buffer[range]);
    Ok(())
}

#[inline]
fn decode_as<T: PcmSample>(buffer: &[u8], index: usize) -> CodecResult<f64> {
    let range = slot(buffer.len(), index, T::WIDTH)?;
    Ok(T::read_ne(&buffer[range]).to_f64())
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 6] = [
        SampleFormat::S8,
        SampleFormat::U8,
        SampleFormat::S16,
        SampleFormat::U16,
        SampleFormat::S32,
        SampleFormat::F32,
    ];

    #[inline]
    pub fn byte_width(self) -> usize {
        match self {
            SampleFormat::S8 => i8::WIDTH,
            SampleFormat::U8 => u8::WIDTH,
            SampleFormat::S16 => i16::WIDTH,
            SampleFormat::U16 => u16::WIDTH,
            SampleFormat::S32 => i32::WIDTH,
            SampleFormat::F32 => f32::WIDTH,
        }
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, SampleFormat::U8 | SampleFormat::U16)
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32)
    }

    pub fn descriptor(self) -> SampleCodec {
        SampleCodec {
            kind: self,
            byte_width: self.byte_width(),
            is_signed: self.is_signed(),
            is_float: self.is_float(),
        }
    }

    /// Value that sits at the centre of the encoding (128 for `U8`).
    #[inline]
    pub fn midpoint(self) -> f64 {
        match self {
            SampleFormat::S8 => i8::equilibrium(),
            SampleFormat::U8 => u8::equilibrium(),
            SampleFormat::S16 => i16::equilibrium(),
            SampleFormat::U16 => u16::equilibrium(),
            SampleFormat::S32 => i32::equilibrium(),
            SampleFormat::F32 => f32::equilibrium(),
        }
    }

    /// Neutral value a device uses for silence, before any host override.
    pub fn default_silence(self) -> f64 {
        self.midpoint()
    }

    /// Write `value` as sample number `index` of `buffer`.
    #[inline]
    pub fn encode(self, buffer: &mut [u8], index: usize, value: f64) -> CodecResult<()> {
        match self {
            SampleFormat::S8 => encode_as::<i8>(buffer, index, value),
            SampleFormat::U8 => encode_as::<u8>(buffer, index, value),
            SampleFormat::S16 => encode_as::<i16>(buffer, index, value),
            SampleFormat::U16 => encode_as::<u16>(buffer, index, value),
            SampleFormat::S32 => encode_as::<i32>(buffer, index, value),
            SampleFormat::F32 => encode_as::<f32>(buffer, index, value),
        }
    }

    /// Read sample number `index` of `buffer` as a plain number.
    #[inline]
    pub fn decode(self, buffer: &[u8], index: usize) -> CodecResult<f64> {
        match self {
            SampleFormat::S8 => decode_as::<i8>(buffer, index),
            SampleFormat::U8 => decode_as::<u8>(buffer, index),
            SampleFormat::S16 => decode_as::<i16>(buffer, index),
            SampleFormat::U16 => decode_as::<u16>(buffer, index),
            SampleFormat::S32 => decode_as::<i32>(buffer, index),
            SampleFormat::F32 => decode_as::<f32>(buffer, index),
        }
    }

    /// Encode a single value into a stack pattern, returning the pattern and
    /// its width. Used to prefill silence without touching a real buffer.
    #[inline]
    pub fn encode_pattern(self, value: f64) -> ([u8; MAX_SAMPLE_BYTES], usize) {
        let width = self.byte_width();
        let mut pattern = [0u8; MAX_SAMPLE_BYTES];
        // width <= MAX_SAMPLE_BYTES, index 0 is always in range
        let _ = self.encode(&mut pattern[..width], 0, value);
        (pattern, width)
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S8 => "S8",
            SampleFormat::U8 => "U8",
            SampleFormat::S16 => "S16",
            SampleFormat::U16 => "U16",
            SampleFormat::S32 => "S32",
            SampleFormat::F32 => "F32",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s8" | "i8" => Ok(SampleFormat::S8),
            "u8" => Ok(SampleFormat::U8),
            "s16" | "i16" => Ok(SampleFormat::S16),
            "u16" => Ok(SampleFormat::U16),
            "s32" | "i32" => Ok(SampleFormat::S32),
            "f32" => Ok(SampleFormat::F32),
            _ => Err(ConfigError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Check a channel count against what the engine can replicate into.
pub fn validate_channels(channels: u16) -> Result<u16, ConfigError> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(ConfigError::UnsupportedChannels(channels));
    }
    Ok(channels)
}

/// Human name for common channel layouts.
pub fn channel_layout_name(channels: u16) -> &'static str {
    match channels {
        1 => "MONO",
        2 => "STEREO",
        4 => "QUAD",
        6 => "HEXA",
        _ => "UNKNOWN",
    }
}
