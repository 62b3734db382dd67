use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quanta::{Clock, Instant as QuantaInstant};

/// Point-in-time view of callback timing, taken off the audio thread.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSnapshot {
    pub callback_count: u64,
    pub frames_synthesized: u64,
    /// Callbacks that produced silence instead of synthesized audio.
    pub silent_callbacks: u64,
    /// Callbacks that took longer than one buffer period.
    pub deadline_misses: u64,
    pub max_callback_nanos: Option<u64>,
    /// EMA of callback duration in nanoseconds.
    pub ema_callback_nanos: f64,
    /// Time available per callback at the negotiated rate.
    pub deadline_nanos: u64,
    pub avg_load_percent: f64,
}

impl PerformanceSnapshot {
    pub fn log_summary(&self, prefix: &str) {
        log::info!("{prefix}Callback timing:");
        log::info!("{prefix}    callbacks         : {}", self.callback_count);
        log::info!("{prefix}    frames            : {}", self.frames_synthesized);
        log::info!("{prefix}    silent callbacks  : {}", self.silent_callbacks);
        log::info!("{prefix}    deadline misses   : {}", self.deadline_misses);
        if let Some(max) = self.max_callback_nanos {
            log::info!("{prefix}    max callback      : {:.3} ms", max as f64 / 1e6);
        }
        log::info!("{prefix}    load (EMA)        : {:.1}%", self.avg_load_percent);
    }
}

/// Callback timing against the buffer deadline.
///
/// Everything called from the audio thread is atomics only. `snapshot` is for
/// the controller.
pub struct DeadlineMonitor {
    clock: Clock,
    deadline_nanos: u64,
    ema_alpha: f64,

    callback_count: AtomicU64,
    frames_synthesized: AtomicU64,
    silent_callbacks: AtomicU64,
    deadline_misses: AtomicU64,
    max_callback_nanos: AtomicU64,
    /// f64 bits
    ema_callback_bits: AtomicU64,
}

impl DeadlineMonitor {
    pub const DEFAULT_EMA_ALPHA: f64 = 0.1;

    pub fn new(frames_per_callback: u32, sample_rate: u32) -> Self {
        let deadline = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(f64::from(frames_per_callback) / f64::from(sample_rate))
        };
        Self::with_deadline(deadline, Self::DEFAULT_EMA_ALPHA)
    }

    pub fn with_deadline(deadline: Duration, ema_alpha: f64) -> Self {
        Self {
            clock: Clock::new(),
            deadline_nanos: u64::try_from(deadline.as_nanos()).unwrap_or(u64::MAX),
            ema_alpha: ema_alpha.clamp(f64::EPSILON, 1.0),
            callback_count: AtomicU64::new(0),
            frames_synthesized: AtomicU64::new(0),
            silent_callbacks: AtomicU64::new(0),
            deadline_misses: AtomicU64::new(0),
            max_callback_nanos: AtomicU64::new(0),
            ema_callback_bits: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn add_frames(&self, frames: u64) {
        self.frames_synthesized.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_silent(&self) {
        self.silent_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_callback_nanos(&self, nanos: u64) {
        if self.deadline_nanos > 0 && nanos > self.deadline_nanos {
            self.deadline_misses.fetch_add(1, Ordering::Relaxed);
        }
        self.max_callback_nanos.fetch_max(nanos, Ordering::Relaxed);

        let sample = nanos as f64;
        let mut old_bits = self.ema_callback_bits.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(old_bits);
            let new = if old == 0.0 {
                sample
            } else {
                old + self.ema_alpha * (sample - old)
            };
            match self.ema_callback_bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    /// Count a callback and time it until the guard drops.
    #[inline(always)]
    pub fn scoped_callback(&self) -> DeadlineGuard<'_> {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        DeadlineGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_nanos(self.deadline_nanos)
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let max_raw = self.max_callback_nanos.load(Ordering::Relaxed);
        let ema = f64::from_bits(self.ema_callback_bits.load(Ordering::Relaxed));
        let avg_load_percent = if self.deadline_nanos > 0 {
            ema / self.deadline_nanos as f64 * 100.0
        } else {
            0.0
        };

        PerformanceSnapshot {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            frames_synthesized: self.frames_synthesized.load(Ordering::Relaxed),
            silent_callbacks: self.silent_callbacks.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            max_callback_nanos: (max_raw > 0).then_some(max_raw),
            ema_callback_nanos: ema,
            deadline_nanos: self.deadline_nanos,
            avg_load_percent,
        }
    }
}

/// Records elapsed callback time on drop.
pub struct DeadlineGuard<'a> {
    monitor: &'a DeadlineMonitor,
    start: QuantaInstant,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.monitor.clock.now().saturating_duration_since(self.start);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.monitor.record_callback_nanos(nanos);
    }
}
