//! Realtime entry point handed to the audio host.
//!
//! The fill engine sits in an `Arc<spin::Mutex<Option<_>>>`. The audio thread
//! only ever `try_lock`s it and writes silence if the lock is held or the
//! engine is gone. The controller takes the engine out with a blocking
//! `lock` when the session stops, which waits out any callback in flight.

use std::sync::Arc;

use crossbeam::channel::Sender;
use spin::Mutex;
use tonescope_core::format::MAX_SAMPLE_BYTES;

use crate::audio_device::negotiation::DeviceSpec;
use crate::error::Diagnostic;
use crate::rt_processing::fill::{FillEngine, fill_pattern};
use crate::rt_processing::performance::DeadlineMonitor;

#[derive(Clone)]
pub struct CallbackSlot {
    engine: Arc<Mutex<Option<FillEngine>>>,
    silence: [u8; MAX_SAMPLE_BYTES],
    silence_width: usize,
    monitor: Arc<DeadlineMonitor>,
    diagnostics: Sender<Diagnostic>,
}

impl CallbackSlot {
    pub fn new(engine: FillEngine, monitor: Arc<DeadlineMonitor>, diagnostics: Sender<Diagnostic>) -> Self {
        let spec: DeviceSpec = *engine.spec();
        let (silence, silence_width) = spec.format.encode_pattern(spec.silence);
        Self {
            engine: Arc::new(Mutex::new(Some(engine))),
            silence,
            silence_width,
            monitor,
            diagnostics,
        }
    }

    /// Fill one device buffer. Returns `true` if the engine ran, `false` if
    /// silence was written instead.
    ///
    /// No allocation, no blocking.
    pub fn process_realtime(&self, output: &mut [u8]) -> bool {
        let _timing = self.monitor.scoped_callback();

        if let Some(mut guard) = self.engine.try_lock() {
            if let Some(engine) = guard.as_mut() {
                match engine.fill(output) {
                    Ok(frames) => {
                        self.monitor.add_frames(frames as u64);
                        return true;
                    }
                    Err(e) => {
                        engine.fill_silence(output);
                        self.monitor.increment_silent();
                        self.report(Diagnostic::FillFailed(e));
                        return false;
                    }
                }
            }
        }

        fill_pattern(output, &self.silence, self.silence_width);
        self.monitor.increment_silent();
        false
    }

    /// Queue a diagnostic for the controller. Dropped if the queue is full.
    #[inline]
    pub fn report(&self, diagnostic: Diagnostic) {
        let _ = self.diagnostics.try_send(diagnostic);
    }

    /// Take the engine out of the slot. Blocks until no callback is running;
    /// every later callback writes silence.
    pub fn retire(&self) -> Option<FillEngine> {
        self.engine.lock().take()
    }

    /// Run `f` on the engine from the controller thread. Blocks like
    /// `retire`; a callback arriving meanwhile writes silence, so only use
    /// this while the device is paused. `None` once retired.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut FillEngine) -> R) -> Option<R> {
        self.engine.lock().as_mut().map(f)
    }

    #[cfg(test)]
    fn is_live(&self) -> bool {
        self.engine.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt_processing::commands::{ControlCommand, PlaybackShared};
    use crate::rt_processing::display_buffer::DisplayBuffer;
    use crossbeam::channel::{Receiver, bounded};
    use tonescope_core::{CodecError, SampleFormat, Waveform, WaveformGenerator};

    fn slot(spec: DeviceSpec) -> (CallbackSlot, Arc<PlaybackShared>, Receiver<Diagnostic>) {
        let (_tx, rx) = bounded(4);
        let shared = Arc::new(PlaybackShared::new(1.0, i64::from(spec.sample_rate)));
        let display = Arc::new(DisplayBuffer::new(spec.frames_per_callback as usize, spec.format).unwrap());
        let engine = FillEngine::new(WaveformGenerator::default(), spec, rx, Arc::clone(&shared), display).unwrap();
        let (diag_tx, diag_rx) = bounded(4);
        let monitor = Arc::new(DeadlineMonitor::new(spec.frames_per_callback, spec.sample_rate));
        (CallbackSlot::new(engine, monitor, diag_tx), shared, diag_rx)
    }

    #[test]
    fn test_runs_engine_when_live() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 2, 8);
        let (slot, shared, _diag) = slot(spec);
        shared.set_paused(false);
        let mut out = vec![0u8; spec.callback_bytes()];
        assert!(slot.process_realtime(&mut out));
        assert_eq!(shared.play_position(), 8);
    }

    #[test]
    fn test_retired_slot_writes_silence() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U16, 1, 8);
        let (slot, shared, _diag) = slot(spec);
        shared.set_paused(false);
        assert!(slot.retire().is_some());
        assert!(!slot.is_live());

        let mut out = vec![0x11u8; spec.callback_bytes()];
        assert!(!slot.process_realtime(&mut out));
        for chunk in out.chunks_exact(2) {
            assert_eq!(chunk, &32768u16.to_ne_bytes());
        }
        assert!(slot.retire().is_none());
    }

    #[test]
    fn test_contended_slot_writes_silence() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S8, 1, 4);
        let (slot, shared, _diag) = slot(spec);
        shared.set_paused(false);

        let _held = slot.engine.lock();
        let mut out = vec![0x7Fu8; 4];
        assert!(!slot.process_realtime(&mut out));
        assert_eq!(out, vec![0; 4]);
    }

    #[test]
    fn test_fill_failure_writes_silence_and_reports() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U16, 2, 4);
        let (_tx, rx) = bounded(1);
        let shared = Arc::new(PlaybackShared::new(1.0, 44_100));
        shared.set_paused(false);
        let display = Arc::new(DisplayBuffer::new(4, SampleFormat::U8).unwrap());
        let engine =
            FillEngine::with_mismatched_display(WaveformGenerator::default(), spec, rx, shared, display);
        let (diag_tx, diag_rx) = bounded(4);
        let monitor = Arc::new(DeadlineMonitor::new(4, 44_100));
        let slot = CallbackSlot::new(engine, Arc::clone(&monitor), diag_tx);

        let mut out = vec![0x55u8; spec.callback_bytes()];
        assert!(!slot.process_realtime(&mut out));
        for chunk in out.chunks_exact(2) {
            assert_eq!(chunk, &32768u16.to_ne_bytes());
        }
        assert_eq!(monitor.snapshot().silent_callbacks, 1);

        let reported: Vec<Diagnostic> = diag_rx.try_iter().collect();
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            reported[0],
            Diagnostic::FillFailed(CodecError::WidthMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_with_engine_applies_while_idle() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 1, 8);
        let (slot, shared, _diag) = slot(spec);
        shared.set_paused(false);
        let mut out = vec![0u8; spec.callback_bytes()];
        slot.process_realtime(&mut out);
        assert_eq!(shared.play_position(), 8);

        let waveform = slot.with_engine(|engine| {
            engine.apply_now(ControlCommand::AdvanceWaveform);
            engine.generator().waveform()
        });
        assert_eq!(waveform, Some(Waveform::Square));
        assert_eq!(shared.play_position(), 0);

        slot.retire();
        assert!(slot.with_engine(|_| ()).is_none());
    }

    #[test]
    fn test_report_drops_when_full() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S8, 1, 4);
        let (slot, _shared, diag) = slot(spec);
        for _ in 0..10 {
            slot.report(Diagnostic::Stream("xrun".into()));
        }
        assert_eq!(diag.try_iter().count(), 4);
    }
}
