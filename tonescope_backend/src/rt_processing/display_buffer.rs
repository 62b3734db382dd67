//! Rolling window of emitted samples for the renderer.
//!
//! Single writer (the fill engine on the audio thread), any number of
//! readers. Bytes live in relaxed atomics; the write cursor is published with
//! release ordering after each sample and read with acquire, so a reader that
//! sees cursor `n` also sees every byte written before sample `n`. Snapshots
//! are not atomic with respect to a concurrent writer: a snapshot taken mid
//! callback can mix old and new samples, which is fine for display.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tonescope_core::error::{CodecError, CodecResult, ConfigError};
use tonescope_core::SampleFormat;

pub struct DisplayBuffer {
    format: SampleFormat,
    bytes_per_sample: usize,
    capacity: usize,
    storage: Box<[AtomicU8]>,
    cursor: AtomicUsize,
}

impl DisplayBuffer {
    /// `capacity` is in samples, normally the negotiated frames per callback.
    pub fn new(capacity: usize, format: SampleFormat) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidFrameCount(0));
        }
        let bytes_per_sample = format.byte_width();
        let storage = (0..capacity * bytes_per_sample)
            .map(|_| AtomicU8::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            format,
            bytes_per_sample,
            capacity,
            storage,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Append one encoded sample at the cursor and advance it, wrapping at
    /// capacity. Writer side only.
    #[inline]
    pub fn write(&self, encoded: &[u8]) -> CodecResult<()> {
        if encoded.len() != self.bytes_per_sample {
            return Err(CodecError::WidthMismatch {
                expected: self.bytes_per_sample,
                actual: encoded.len(),
            });
        }

        let position = self.cursor.load(Ordering::Relaxed);
        let start = position * self.bytes_per_sample;
        for (cell, &byte) in self.storage[start..start + self.bytes_per_sample]
            .iter()
            .zip(encoded)
        {
            cell.store(byte, Ordering::Relaxed);
        }

        let next = if position + 1 >= self.capacity { 0 } else { position + 1 };
        self.cursor.store(next, Ordering::Release);
        Ok(())
    }

    /// Zero every byte and reset the cursor.
    pub fn clear(&self) {
        for cell in self.storage.iter() {
            cell.store(0, Ordering::Relaxed);
        }
        self.cursor.store(0, Ordering::Release);
    }

    /// Copy the current contents for the renderer.
    pub fn snapshot(&self) -> DisplaySnapshot {
        let mut bytes = Vec::with_capacity(self.storage.len());
        let cursor = self.snapshot_into(&mut bytes);
        DisplaySnapshot {
            format: self.format,
            cursor,
            bytes,
        }
    }

    /// Copy the raw bytes into `out`, reusing its allocation. Returns the
    /// cursor observed before copying.
    pub fn snapshot_into(&self, out: &mut Vec<u8>) -> usize {
        let cursor = self.cursor.load(Ordering::Acquire);
        out.clear();
        out.extend(self.storage.iter().map(|cell| cell.load(Ordering::Relaxed)));
        cursor
    }

    /// Capacity in samples.
    pub fn size(&self) -> usize {
        self.capacity
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn log_state(&self, prefix: &str) {
        log::info!("{prefix}DisplayBuffer:");
        log::info!("{prefix}    format            : {}", self.format);
        log::info!("{prefix}    size (samples)    : {}", self.capacity);
        log::info!("{prefix}    bytes per sample  : {}", self.bytes_per_sample);
        log::info!("{prefix}    cursor            : {}", self.cursor());
    }
}

/// A copy of the display ring, in storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySnapshot {
    format: SampleFormat,
    cursor: usize,
    bytes: Vec<u8>,
}

impl DisplaySnapshot {
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Slot the next write would have gone to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.format.byte_width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sample(&self, index: usize) -> CodecResult<f64> {
        self.format.decode(&self.bytes, index)
    }

    /// Decoded samples in storage order, the way a sweep is drawn.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).filter_map(move |i| self.sample(i).ok())
    }

    /// Decoded samples oldest first.
    pub fn ordered(&self) -> impl Iterator<Item = f64> + '_ {
        let len = self.len();
        let start = if len == 0 { 0 } else { self.cursor % len };
        (start..len)
            .chain(0..start)
            .filter_map(move |i| self.sample(i).ok())
    }
}
