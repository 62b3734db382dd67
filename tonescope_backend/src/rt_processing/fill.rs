//! The realtime fill routine.
//!
//! Runs on the host audio thread. Owns the generator and the play position;
//! everything the controller wants changed arrives through the command queue.
//! `fill` performs no allocation, locking or blocking.

use std::sync::Arc;

use crossbeam::channel::Receiver;
use tonescope_core::error::{CodecResult, ConfigError};
use tonescope_core::format::MAX_SAMPLE_BYTES;
use tonescope_core::WaveformGenerator;

use crate::audio_device::negotiation::DeviceSpec;
use crate::rt_processing::commands::{ControlCommand, PlaybackShared};
use crate::rt_processing::display_buffer::DisplayBuffer;

/// Fill `output` with repetitions of `pattern[..width]`; trailing bytes that do
/// not make up a whole sample are zeroed.
#[inline]
pub fn fill_pattern(output: &mut [u8], pattern: &[u8; MAX_SAMPLE_BYTES], width: usize) {
    let mut chunks = output.chunks_exact_mut(width);
    for chunk in &mut chunks {
        chunk.copy_from_slice(&pattern[..width]);
    }
    chunks.into_remainder().fill(0);
}

pub struct FillEngine {
    generator: WaveformGenerator,
    spec: DeviceSpec,
    silence: [u8; MAX_SAMPLE_BYTES],
    play_position: u64,
    commands: Receiver<ControlCommand>,
    shared: Arc<PlaybackShared>,
    display: Arc<DisplayBuffer>,
}

impl FillEngine {
    pub fn new(
        generator: WaveformGenerator,
        spec: DeviceSpec,
        commands: Receiver<ControlCommand>,
        shared: Arc<PlaybackShared>,
        display: Arc<DisplayBuffer>,
    ) -> Result<Self, ConfigError> {
        spec.validate()?;
        if display.format() != spec.format {
            return Err(ConfigError::UnsupportedFormat(format!(
                "display buffer holds {}, stream is {}",
                display.format(),
                spec.format
            )));
        }
        Ok(Self::assemble(generator, spec, commands, shared, display))
    }

    /// Engine whose display ring does not match the stream format, so every
    /// synthesized frame fails its display write.
    #[cfg(test)]
    pub(crate) fn with_mismatched_display(
        generator: WaveformGenerator,
        spec: DeviceSpec,
        commands: Receiver<ControlCommand>,
        shared: Arc<PlaybackShared>,
        display: Arc<DisplayBuffer>,
    ) -> Self {
        assert_ne!(display.format().byte_width(), spec.format.byte_width());
        Self::assemble(generator, spec, commands, shared, display)
    }

    fn assemble(
        generator: WaveformGenerator,
        spec: DeviceSpec,
        commands: Receiver<ControlCommand>,
        shared: Arc<PlaybackShared>,
        display: Arc<DisplayBuffer>,
    ) -> Self {
        let (silence, _) = spec.format.encode_pattern(spec.silence);
        let play_position = shared.play_position();

        Self {
            generator,
            spec,
            silence,
            play_position,
            commands,
            shared,
            display,
        }
    }

    /// Apply every queued control command.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    /// Apply `command` now, after anything still queued, without waiting for
    /// a callback. For use while the device is not pulling buffers.
    pub fn apply_now(&mut self, command: ControlCommand) {
        self.drain_commands();
        self.apply(command);
    }

    fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetFrequency(frequency) => self.generator.set_frequency(frequency),
            ControlCommand::SetAmplitude(amplitude) => self.generator.set_amplitude(amplitude),
            ControlCommand::SetPhase(phase) => self.generator.set_phase(phase),
            ControlCommand::SetWaveform(waveform) => self.generator.set_waveform(waveform),
            ControlCommand::AdvanceWaveform => {
                self.generator.advance_waveform();
                self.play_position = 0;
                self.display.clear();
                self.shared.publish_play_position(0);
            }
            ControlCommand::SetPlayPosition(position) => {
                self.play_position = position;
                self.shared.publish_play_position(position);
            }
        }
    }

    /// Fill one device buffer. Returns the number of frames synthesized.
    ///
    /// On `Err` the buffer may be partly written; the caller replaces it with
    /// silence.
    pub fn fill(&mut self, output: &mut [u8]) -> CodecResult<usize> {
        self.drain_commands();

        let width = self.spec.bytes_per_sample();
        let frame_bytes = self.spec.bytes_per_frame();
        let frame_count = output.len() / frame_bytes;
        let (frames, tail) = output.split_at_mut(frame_count * frame_bytes);
        tail.fill(0);

        if self.shared.is_paused() {
            fill_pattern(frames, &self.silence, width);
            return Ok(0);
        }

        let volume = f64::from(self.shared.volume());
        let budget = self.shared.length_budget();
        let midpoint = self.spec.format.midpoint();
        let sample_rate = f64::from(self.spec.sample_rate);
        let mut synthesized = 0;

        for frame in frames.chunks_exact_mut(frame_bytes) {
            if budget <= 0 {
                fill_pattern(frame, &self.silence, width);
                continue;
            }

            let t = self.play_position as f64 / sample_rate;
            let y = self.generator.sample(t) * volume;
            self.spec.format.encode(frame, 0, y + midpoint)?;

            // Channels 1..channels repeat channel 0
            let (first, rest) = frame.split_at_mut(width);
            for slot in rest.chunks_exact_mut(width) {
                slot.copy_from_slice(first);
            }

            self.play_position += 1;
            self.display.write(first)?;
            synthesized += 1;
        }

        self.shared.publish_play_position(self.play_position);
        Ok(synthesized)
    }

    /// Fill `output` with the device silence value.
    #[inline]
    pub fn fill_silence(&self, output: &mut [u8]) {
        fill_pattern(output, &self.silence, self.spec.bytes_per_sample());
    }

    pub fn generator(&self) -> &WaveformGenerator {
        &self.generator
    }

    pub fn play_position(&self) -> u64 {
        self.play_position
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{Sender, bounded};
    use tonescope_core::{SampleFormat, Waveform};

    struct Rig {
        engine: FillEngine,
        commands: Sender<ControlCommand>,
        shared: Arc<PlaybackShared>,
        display: Arc<DisplayBuffer>,
    }

    fn rig(spec: DeviceSpec, generator: WaveformGenerator) -> Rig {
        let (commands, rx) = bounded(16);
        let shared = Arc::new(PlaybackShared::new(1.0, i64::from(spec.sample_rate)));
        shared.set_paused(false);
        let display = Arc::new(DisplayBuffer::new(spec.frames_per_callback as usize, spec.format).unwrap());
        let engine = FillEngine::new(generator, spec, rx, Arc::clone(&shared), Arc::clone(&display)).unwrap();
        Rig {
            engine,
            commands,
            shared,
            display,
        }
    }

    #[test]
    fn test_fill_pattern_zeroes_tail() {
        let mut out = [0xFFu8; 7];
        let (pattern, width) = SampleFormat::U16.encode_pattern(32768.0);
        fill_pattern(&mut out, &pattern, width);
        let silence = 32768u16.to_ne_bytes();
        assert_eq!(&out[0..2], &silence);
        assert_eq!(&out[4..6], &silence);
        assert_eq!(out[6], 0);
    }

    #[test]
    fn test_four_channel_replication_stays_in_frame() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S16, 4, 8);
        let mut rig = rig(spec, WaveformGenerator::new(440, 1000, Waveform::Sine, 0.7));

        // One frame of output followed by a sentinel frame that must not change
        let mut out = vec![0x5Au8; spec.bytes_per_frame() * 2];
        let written = rig.engine.fill(&mut out[..spec.bytes_per_frame()]).unwrap();
        assert_eq!(written, 1);

        let channel0 = &out[0..2];
        assert_ne!(channel0, &[0x5A, 0x5A]);
        for channel in 1..4 {
            assert_eq!(&out[channel * 2..channel * 2 + 2], channel0, "channel {channel}");
        }
        assert!(out[spec.bytes_per_frame()..].iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_every_frame_replicated_across_odd_channel_count() {
        let spec = DeviceSpec::new(48_000, SampleFormat::F32, 3, 32);
        let mut rig = rig(spec, WaveformGenerator::new(440, 1, Waveform::Triangle, 0.0));
        let mut out = vec![0u8; spec.callback_bytes()];
        assert_eq!(rig.engine.fill(&mut out).unwrap(), 32);

        for frame in out.chunks_exact(spec.bytes_per_frame()) {
            assert_eq!(&frame[0..4], &frame[4..8]);
            assert_eq!(&frame[0..4], &frame[8..12]);
        }
    }

    #[test]
    fn test_position_advances_and_display_mirrors_channel0() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 2, 16);
        let mut rig = rig(spec, WaveformGenerator::default());
        let mut out = vec![0u8; spec.callback_bytes()];
        rig.engine.fill(&mut out).unwrap();

        assert_eq!(rig.engine.play_position(), 16);
        assert_eq!(rig.shared.play_position(), 16);

        let snapshot = rig.display.snapshot();
        assert_eq!(rig.display.cursor(), 0);
        for (frame, shown) in out.chunks_exact(2).zip(snapshot.bytes()) {
            assert_eq!(frame[0], *shown);
        }
    }

    #[test]
    fn test_silence_gate() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 2, 64);
        let mut rig = rig(spec, WaveformGenerator::default());
        rig.shared.set_length_budget(0);

        let mut out = vec![0u8; spec.callback_bytes()];
        assert_eq!(rig.engine.fill(&mut out).unwrap(), 0);
        assert!(out.iter().all(|&b| b == 128));
        assert_eq!(rig.engine.play_position(), 0);
        assert!(rig.display.snapshot().bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_budget_is_not_consumed_by_playback() {
        let spec = DeviceSpec::new(1_000, SampleFormat::S16, 1, 100);
        let mut rig = rig(spec, WaveformGenerator::default());
        rig.shared.set_length_budget(10);

        let mut out = vec![0u8; spec.callback_bytes()];
        for _ in 0..5 {
            assert_eq!(rig.engine.fill(&mut out).unwrap(), 100);
        }
        assert_eq!(rig.shared.length_budget(), 10);
        assert_eq!(rig.engine.play_position(), 500);
    }

    #[test]
    fn test_paused_emits_silence_without_advancing() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S16, 2, 8);
        let mut rig = rig(spec, WaveformGenerator::default());
        rig.shared.set_paused(true);
        let mut out = vec![0xEEu8; spec.callback_bytes()];
        assert_eq!(rig.engine.fill(&mut out).unwrap(), 0);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(rig.engine.play_position(), 0);
    }

    #[test]
    fn test_commands_apply_before_first_sample() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S32, 1, 4);
        let mut rig = rig(spec, WaveformGenerator::new(440, 100, Waveform::Sine, 0.0));
        rig.commands.send(ControlCommand::SetWaveform(Waveform::Square)).unwrap();
        rig.commands.send(ControlCommand::SetAmplitude(7)).unwrap();

        let mut out = vec![0u8; spec.callback_bytes()];
        rig.engine.fill(&mut out).unwrap();
        assert_eq!(rig.engine.generator().waveform(), Waveform::Square);
        // sin(0) == 0 resolves high
        assert_eq!(SampleFormat::S32.decode(&out, 0).unwrap(), 7.0);
    }

    #[test]
    fn test_advance_waveform_resets_position_and_display() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 2, 32);
        let mut rig = rig(spec, WaveformGenerator::default());
        let mut out = vec![0u8; spec.callback_bytes() / 2];
        rig.engine.fill(&mut out).unwrap();
        assert_eq!(rig.engine.play_position(), 16);
        assert_ne!(rig.display.cursor(), 0);

        rig.commands.send(ControlCommand::AdvanceWaveform).unwrap();
        rig.engine.fill(&mut []).unwrap();

        assert_eq!(rig.engine.generator().waveform(), Waveform::Square);
        assert_eq!(rig.engine.play_position(), 0);
        assert_eq!(rig.shared.play_position(), 0);
        assert_eq!(rig.display.cursor(), 0);
        assert!(rig.display.snapshot().bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_apply_now_keeps_queue_order() {
        let spec = DeviceSpec::new(44_100, SampleFormat::U8, 1, 8);
        let mut rig = rig(spec, WaveformGenerator::default());
        let mut out = vec![0u8; spec.callback_bytes()];
        rig.engine.fill(&mut out).unwrap();
        assert_eq!(rig.shared.play_position(), 8);

        rig.commands.send(ControlCommand::SetWaveform(Waveform::Triangle)).unwrap();
        rig.engine.apply_now(ControlCommand::AdvanceWaveform);

        assert_eq!(rig.engine.generator().waveform(), Waveform::Sine);
        assert_eq!(rig.shared.play_position(), 0);
        assert!(rig.display.snapshot().bytes().iter().all(|&b| b == 0));
        assert!(rig.commands.is_empty());
    }

    #[test]
    fn test_volume_scales_output() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S16, 1, 1);
        let mut rig = rig(spec, WaveformGenerator::new(440, 1000, Waveform::Square, 0.0));
        rig.shared.set_volume(0.5);
        let mut out = vec![0u8; 2];
        rig.engine.fill(&mut out).unwrap();
        assert_eq!(SampleFormat::S16.decode(&out, 0).unwrap(), 500.0);
    }

    #[test]
    fn test_partial_frame_tail_is_zeroed() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S16, 2, 4);
        let mut rig = rig(spec, WaveformGenerator::default());
        let mut out = vec![0xABu8; spec.bytes_per_frame() * 2 + 3];
        assert_eq!(rig.engine.fill(&mut out).unwrap(), 2);
        assert_eq!(&out[8..], &[0, 0, 0]);
    }

    #[test]
    fn test_mismatched_display_rejected() {
        let spec = DeviceSpec::new(44_100, SampleFormat::S16, 2, 4);
        let (_tx, rx) = bounded(1);
        let display = Arc::new(DisplayBuffer::new(4, SampleFormat::U8).unwrap());
        assert!(
            FillEngine::new(
                WaveformGenerator::default(),
                spec,
                rx,
                Arc::new(PlaybackShared::default()),
                display
            )
            .is_err()
        );
    }
}
