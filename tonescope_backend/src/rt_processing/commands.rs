//! Messages and shared atomics between the controller and the audio thread.
//!
//! Generator parameters travel as `ControlCommand`s through a bounded queue
//! that the fill engine drains before synthesizing anything, so a callback
//! never sees a half-updated generator. Scalars the audio thread only reads
//! once per callback (volume, paused, length budget) are plain atomics.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crossbeam::atomic::AtomicCell;
use tonescope_core::Waveform;

/// Capacity of the controller → audio thread queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Generator and transport updates applied at the start of a callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    SetFrequency(i32),
    SetAmplitude(i32),
    SetPhase(f64),
    SetWaveform(Waveform),
    /// Next waveform, play position back to 0, display history cleared.
    AdvanceWaveform,
    SetPlayPosition(u64),
}

/// User-level control events, as produced by a keyboard or similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    NextWaveform,
    FrequencyUp,
    FrequencyDown,
    AmplitudeUp,
    AmplitudeDown,
    TogglePlayback,
}

/// Playback state visible from both sides.
#[derive(Debug)]
pub struct PlaybackShared {
    volume: AtomicCell<f32>,
    paused: AtomicBool,
    length_budget: AtomicI64,
    /// Published by the audio thread at the end of every callback.
    play_position: AtomicU64,
}

impl PlaybackShared {
    pub fn new(volume: f32, length_budget: i64) -> Self {
        Self {
            volume: AtomicCell::new(volume),
            paused: AtomicBool::new(true),
            length_budget: AtomicI64::new(length_budget),
            play_position: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume);
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    #[inline]
    pub fn length_budget(&self) -> i64 {
        self.length_budget.load(Ordering::Relaxed)
    }

    pub fn set_length_budget(&self, budget: i64) {
        self.length_budget.store(budget, Ordering::Relaxed);
    }

    pub fn play_position(&self) -> u64 {
        self.play_position.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn publish_play_position(&self, position: u64) {
        self.play_position.store(position, Ordering::Release);
    }
}

impl Default for PlaybackShared {
    fn default() -> Self {
        Self::new(1.0, 0)
    }
}
