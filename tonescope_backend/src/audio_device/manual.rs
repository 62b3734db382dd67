//! Headless host. Nothing calls the fill routine on its own; the owner of a
//! `ManualDriver` pumps buffers whenever it wants them. Used for tests and
//! offline rendering.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio_device::host::AudioHost;
use crate::audio_device::negotiation::{ConfigNegotiator, DeviceCapabilities, DeviceSpec, StreamRequest};
use crate::error::{DeviceError, DeviceResult, EngineResult};
use crate::rt_processing::callback::CallbackSlot;

#[derive(Default)]
struct DriverState {
    slot: Option<CallbackSlot>,
    spec: Option<DeviceSpec>,
    paused: bool,
    callbacks: u64,
}

pub struct ManualHost {
    capabilities: DeviceCapabilities,
    fail_open: bool,
    state: Arc<Mutex<DriverState>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::permissive("manual"))
    }

    /// A host that negotiates against `capabilities`, so requests outside
    /// them come back changed or rejected.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            fail_open: false,
            state: Arc::new(Mutex::new(DriverState::default())),
        }
    }

    /// Make every later `open` fail.
    pub fn fail_open(mut self, fail: bool) -> Self {
        self.fail_open = fail;
        self
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Handle for pumping callbacks. Stays valid after the host moves into a
    /// session.
    pub fn driver(&self) -> ManualDriver {
        ManualDriver {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for ManualHost {
    fn negotiate(&mut self, request: &StreamRequest) -> EngineResult<DeviceSpec> {
        let negotiated = ConfigNegotiator::negotiate(&self.capabilities, request)?;
        if !negotiated.exact() {
            log::info!("ManualHost: renegotiated to {}", negotiated.spec);
        }
        Ok(negotiated.spec)
    }

    fn open(&mut self, spec: &DeviceSpec, slot: CallbackSlot) -> DeviceResult<()> {
        if self.fail_open {
            return Err(DeviceError::Open(format!("{} refused {spec}", self.capabilities.name)));
        }
        let mut state = self.state.lock();
        state.slot = Some(slot);
        state.spec = Some(*spec);
        state.paused = true;
        state.callbacks = 0;
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.slot.is_none() {
            return Err(DeviceError::NotOpen);
        }
        state.paused = paused;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.slot = None;
        state.paused = true;
    }
}

/// Pumps a `ManualHost`'s callback from the caller's thread.
#[derive(Clone)]
pub struct ManualDriver {
    state: Arc<Mutex<DriverState>>,
}

impl ManualDriver {
    /// Run one callback into `output`, ignoring the device pause state.
    /// Returns `false` if nothing is open or the slot wrote silence.
    pub fn pump(&self, output: &mut [u8]) -> bool {
        // Release the driver lock before running the slot; teardown is fenced
        // by the slot itself
        let slot = {
            let mut state = self.state.lock();
            state.callbacks += 1;
            state.slot.clone()
        };
        match slot {
            Some(slot) => slot.process_realtime(output),
            None => false,
        }
    }

    /// One full callback buffer at the negotiated size, or `None` if the
    /// device was never opened or is paused.
    pub fn pump_callback(&self) -> Option<Vec<u8>> {
        let spec = {
            let state = self.state.lock();
            if state.slot.is_none() || state.paused {
                return None;
            }
            state.spec?
        };
        let mut buffer = vec![0u8; spec.callback_bytes()];
        self.pump(&mut buffer);
        Some(buffer)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().slot.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn spec(&self) -> Option<DeviceSpec> {
        self.state.lock().spec
    }

    /// Calls to `pump` since the device was last opened.
    pub fn callbacks(&self) -> u64 {
        self.state.lock().callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonescope_core::SampleFormat;

    #[test]
    fn test_permissive_negotiation_is_exact() {
        let mut host = ManualHost::new();
        let request = StreamRequest::new(44_100, SampleFormat::U8, 2, 1024);
        let spec = host.negotiate(&request).unwrap();
        assert_eq!(spec, DeviceSpec::new(44_100, SampleFormat::U8, 2, 1024));
    }

    #[test]
    fn test_restricted_device_changes_rate() {
        let mut capabilities = DeviceCapabilities::permissive("fixed");
        capabilities.supported_sample_rates = vec![48_000];
        capabilities.min_sample_rate = 48_000;
        capabilities.max_sample_rate = 48_000;
        let mut host = ManualHost::with_capabilities(capabilities);

        let spec = host
            .negotiate(&StreamRequest::new(44_100, SampleFormat::S16, 2, 512))
            .unwrap();
        assert_eq!(spec.sample_rate, 48_000);
        assert!(
            host.negotiate(&StreamRequest::new(44_100, SampleFormat::S16, 2, 512).allow_rate_change(false))
                .is_err()
        );
    }

    #[test]
    fn test_unopened_driver_pumps_nothing() {
        let host = ManualHost::new();
        let driver = host.driver();
        let mut out = [0u8; 8];
        assert!(!driver.pump(&mut out));
        assert!(driver.pump_callback().is_none());
        assert!(!driver.is_open());
    }

    #[test]
    fn test_set_paused_requires_open_device() {
        let mut host = ManualHost::new();
        assert!(matches!(host.set_paused(false), Err(DeviceError::NotOpen)));
    }
}
