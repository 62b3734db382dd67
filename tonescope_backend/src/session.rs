//! The session handle: owns the host, the generator mirror, the display ring
//! and the callback slot, and drives the stream through its lifecycle.
//!
//! ```text
//! Uninitialized -> Ready -> Playing <-> Paused -> Stopped
//! ```
//!
//! `Stopped` is terminal and reachable from every state.

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use tonescope_core::{TonescopeConfig, Waveform, WaveformGenerator};

use crate::audio_device::host::AudioHost;
use crate::audio_device::negotiation::{DeviceSpec, StreamRequest};
use crate::error::{Diagnostic, EngineError, EngineResult};
use crate::rt_processing::callback::CallbackSlot;
use crate::rt_processing::commands::{COMMAND_QUEUE_CAPACITY, ControlCommand, ControlEvent, PlaybackShared};
use crate::rt_processing::display_buffer::{DisplayBuffer, DisplaySnapshot};
use crate::rt_processing::fill::FillEngine;
use crate::rt_processing::performance::{DeadlineMonitor, PerformanceSnapshot};

/// Frequency step of one `FrequencyUp`/`FrequencyDown` event, in Hz.
pub const FREQUENCY_STEP: i32 = 1;
/// Amplitude step of one `AmplitudeUp`/`AmplitudeDown` event.
pub const AMPLITUDE_STEP: i32 = 1;

const DIAGNOSTIC_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Ready => "ready",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct Session<H: AudioHost> {
    host: H,
    state: EngineState,

    /// Controller-side copy of the generator. Updated only after the matching
    /// command was queued.
    generator: WaveformGenerator,
    /// Budget applied at `initialize` instead of the sample rate.
    length_budget_override: Option<i64>,

    spec: Option<DeviceSpec>,
    display: Option<Arc<DisplayBuffer>>,
    shared: Arc<PlaybackShared>,
    commands: Option<Sender<ControlCommand>>,
    diagnostics_tx: Sender<Diagnostic>,
    diagnostics_rx: Receiver<Diagnostic>,
    slot: Option<CallbackSlot>,
    monitor: Option<Arc<DeadlineMonitor>>,
}

impl<H: AudioHost> Session<H> {
    pub fn new(host: H, generator: WaveformGenerator) -> Self {
        let (diagnostics_tx, diagnostics_rx) = bounded(DIAGNOSTIC_QUEUE_CAPACITY);
        Self {
            host,
            state: EngineState::Uninitialized,
            generator,
            length_budget_override: None,
            spec: None,
            display: None,
            shared: Arc::new(PlaybackShared::default()),
            commands: None,
            diagnostics_tx,
            diagnostics_rx,
            slot: None,
            monitor: None,
        }
    }

    /// Session with the generator, volume and budget from `config`. The
    /// stream section is read by `initialize_from_config`.
    pub fn from_config(host: H, config: &TonescopeConfig) -> Self {
        let mut session = Self::new(host, config.wave.generator());
        session.shared.set_volume(config.playback.volume);
        session.length_budget_override = config.playback.length_budget;
        session
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Negotiate the stream, build the fill engine and open the device paused.
    ///
    /// A device that fails to open leaves the session `Stopped`.
    pub fn initialize(&mut self, request: &StreamRequest) -> EngineResult<DeviceSpec> {
        self.expect_state("initialize", &[EngineState::Uninitialized])?;

        let spec = self.host.negotiate(request)?;
        spec.validate()?;
        spec.log_spec("initialize: ");

        let display = Arc::new(DisplayBuffer::new(spec.frames_per_callback as usize, spec.format)?);
        self.shared.set_paused(true);
        self.shared.publish_play_position(0);
        self.shared
            .set_length_budget(self.length_budget_override.unwrap_or(i64::from(spec.sample_rate)));

        let (commands, commands_rx) = bounded(COMMAND_QUEUE_CAPACITY);
        let engine = FillEngine::new(
            self.generator,
            spec,
            commands_rx,
            Arc::clone(&self.shared),
            Arc::clone(&display),
        )?;
        let monitor = Arc::new(DeadlineMonitor::new(spec.frames_per_callback, spec.sample_rate));
        let slot = CallbackSlot::new(engine, Arc::clone(&monitor), self.diagnostics_tx.clone());

        if let Err(e) = self.host.open(&spec, slot.clone()) {
            log::error!("initialize: {e}");
            slot.retire();
            self.state = EngineState::Stopped;
            return Err(e.into());
        }

        self.spec = Some(spec);
        self.display = Some(display);
        self.commands = Some(commands);
        self.slot = Some(slot);
        self.monitor = Some(monitor);
        self.state = EngineState::Ready;
        log::info!("initialize: session ready");
        Ok(spec)
    }

    /// `initialize` with the stream section of `config`.
    pub fn initialize_from_config(&mut self, config: &TonescopeConfig) -> EngineResult<DeviceSpec> {
        config.stream.validate()?;
        self.initialize(&StreamRequest::from(&config.stream))
    }

    pub fn play(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Playing => Ok(()),
            EngineState::Ready | EngineState::Paused => {
                self.shared.set_paused(false);
                if let Err(e) = self.host.set_paused(false) {
                    self.shared.set_paused(true);
                    return Err(e.into());
                }
                self.state = EngineState::Playing;
                log::debug!("play: playing");
                Ok(())
            }
            state => Err(EngineError::InvalidState {
                operation: "play",
                state,
            }),
        }
    }

    pub fn pause(&mut self) -> EngineResult<()> {
        match self.state {
            EngineState::Ready | EngineState::Paused => Ok(()),
            EngineState::Playing => {
                self.host.set_paused(true)?;
                self.shared.set_paused(true);
                self.state = EngineState::Paused;
                log::debug!("pause: paused");
                Ok(())
            }
            state => Err(EngineError::InvalidState {
                operation: "pause",
                state,
            }),
        }
    }

    pub fn toggle_playback(&mut self) -> EngineResult<()> {
        if self.state == EngineState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Pause, close the device, wait out any callback in flight and clear
    /// the display ring. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }

        if self.state == EngineState::Playing {
            if let Err(e) = self.host.set_paused(true) {
                log::warn!("stop: {e}");
            }
        }
        self.shared.set_paused(true);
        self.host.close();

        if let Some(slot) = self.slot.take() {
            slot.retire();
        }
        self.commands = None;
        if let Some(display) = &self.display {
            display.clear();
        }

        self.state = EngineState::Stopped;
        log::info!("stop: session stopped");
    }

    // -------------------------------------------------------------------------
    // Generator control
    // -------------------------------------------------------------------------

    /// Queue `command` for the audio thread. Before `initialize` there is no
    /// engine yet and the mirror alone is updated.
    fn send(&self, operation: &'static str, command: ControlCommand) -> EngineResult<()> {
        match (self.state, &self.commands) {
            (EngineState::Uninitialized, _) => Ok(()),
            (EngineState::Stopped, _) | (_, None) => Err(EngineError::InvalidState {
                operation,
                state: self.state,
            }),
            (_, Some(commands)) => commands.try_send(command).map_err(|e| match e {
                TrySendError::Full(_) => EngineError::CommandQueueFull,
                TrySendError::Disconnected(_) => EngineError::InvalidState {
                    operation,
                    state: self.state,
                },
            }),
        }
    }

    pub fn set_frequency(&mut self, frequency: i32) -> EngineResult<()> {
        self.send("set frequency", ControlCommand::SetFrequency(frequency))?;
        self.generator.set_frequency(frequency);
        Ok(())
    }

    pub fn set_amplitude(&mut self, amplitude: i32) -> EngineResult<()> {
        self.send("set amplitude", ControlCommand::SetAmplitude(amplitude))?;
        self.generator.set_amplitude(amplitude);
        Ok(())
    }

    pub fn set_phase(&mut self, phase: f64) -> EngineResult<()> {
        self.send("set phase", ControlCommand::SetPhase(phase))?;
        self.generator.set_phase(phase);
        Ok(())
    }

    pub fn set_waveform(&mut self, waveform: Waveform) -> EngineResult<()> {
        self.send("set waveform", ControlCommand::SetWaveform(waveform))?;
        self.generator.set_waveform(waveform);
        Ok(())
    }

    pub fn change_frequency(&mut self, delta: i32) -> EngineResult<()> {
        let mut next = self.generator;
        next.change_frequency(delta);
        self.set_frequency(next.frequency())
    }

    pub fn change_amplitude(&mut self, delta: i32) -> EngineResult<()> {
        let mut next = self.generator;
        next.change_amplitude(delta);
        self.set_amplitude(next.amplitude())
    }

    /// Move to the next waveform, restart play position at 0 and clear the
    /// display ring.
    ///
    /// While playing this goes through the queue. A paused device pulls no
    /// buffers, so in `Ready` and `Paused` the engine is updated in place.
    pub fn advance_waveform(&mut self) -> EngineResult<Waveform> {
        match (self.state, &self.slot) {
            (EngineState::Ready | EngineState::Paused, Some(slot)) => {
                slot.with_engine(|engine| engine.apply_now(ControlCommand::AdvanceWaveform))
                    .ok_or(EngineError::InvalidState {
                        operation: "advance waveform",
                        state: self.state,
                    })?;
            }
            _ => self.send("advance waveform", ControlCommand::AdvanceWaveform)?,
        }
        Ok(self.generator.advance_waveform())
    }

    pub fn handle_event(&mut self, event: ControlEvent) -> EngineResult<()> {
        match event {
            ControlEvent::NextWaveform => self.advance_waveform().map(|waveform| {
                log::info!("handle_event: waveform {waveform}");
            }),
            ControlEvent::FrequencyUp => self.change_frequency(FREQUENCY_STEP),
            ControlEvent::FrequencyDown => self.change_frequency(-FREQUENCY_STEP),
            ControlEvent::AmplitudeUp => self.change_amplitude(AMPLITUDE_STEP),
            ControlEvent::AmplitudeDown => self.change_amplitude(-AMPLITUDE_STEP),
            ControlEvent::TogglePlayback => self.toggle_playback(),
        }
    }

    // -------------------------------------------------------------------------
    // Playback state
    // -------------------------------------------------------------------------

    /// Frames synthesized since the last reset, as of the last callback.
    pub fn play_position(&self) -> u64 {
        self.shared.play_position()
    }

    pub fn set_play_position(&mut self, position: u64) -> EngineResult<()> {
        if self.state == EngineState::Uninitialized {
            return Err(EngineError::InvalidState {
                operation: "set play position",
                state: self.state,
            });
        }
        self.send("set play position", ControlCommand::SetPlayPosition(position))
    }

    pub fn length_budget(&self) -> i64 {
        self.shared.length_budget()
    }

    /// Silence gate: at `<= 0` the engine writes silence. Before `initialize`
    /// this also replaces the sample-rate default.
    pub fn set_length_budget(&mut self, budget: i64) {
        if self.state == EngineState::Uninitialized {
            self.length_budget_override = Some(budget);
        }
        self.shared.set_length_budget(budget);
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.shared.set_volume(volume);
    }

    // -------------------------------------------------------------------------
    // Getters
    // -------------------------------------------------------------------------

    pub fn generator(&self) -> &WaveformGenerator {
        &self.generator
    }

    pub fn frequency(&self) -> i32 {
        self.generator.frequency()
    }

    pub fn amplitude(&self) -> i32 {
        self.generator.amplitude()
    }

    pub fn phase(&self) -> f64 {
        self.generator.phase()
    }

    pub fn waveform(&self) -> Waveform {
        self.generator.waveform()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn device_spec(&self) -> Option<&DeviceSpec> {
        self.spec.as_ref()
    }

    pub fn display(&self) -> Option<&Arc<DisplayBuffer>> {
        self.display.as_ref()
    }

    pub fn display_snapshot(&self) -> Option<DisplaySnapshot> {
        self.display.as_ref().map(|display| display.snapshot())
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn performance(&self) -> Option<PerformanceSnapshot> {
        self.monitor.as_ref().map(|monitor| monitor.snapshot())
    }

    /// Realtime faults reported since the last call.
    pub fn poll_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics_rx.try_iter().collect()
    }

    /// Drain diagnostics into the log. Returns how many there were.
    pub fn log_diagnostics(&self) -> usize {
        let mut count = 0;
        for diagnostic in self.diagnostics_rx.try_iter() {
            log::warn!("audio thread: {diagnostic}");
            count += 1;
        }
        count
    }

    pub fn log_summary(&self, prefix: &str) {
        log::info!("{prefix}Session state: {}", self.state);
        match &self.spec {
            Some(spec) => spec.log_spec(prefix),
            None => log::info!("{prefix}No device negotiated"),
        }
        self.generator.log_state(prefix);
        log::info!("{prefix}Play position : {}", self.play_position());
        log::info!("{prefix}Length budget : {}", self.length_budget());
        log::info!("{prefix}Volume        : {}", self.volume());
        if let Some(display) = &self.display {
            display.log_state(prefix);
        }
        if let Some(performance) = self.performance() {
            performance.log_summary(prefix);
        }
    }

    fn expect_state(&self, operation: &'static str, allowed: &[EngineState]) -> EngineResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl<H: AudioHost> Drop for Session<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
