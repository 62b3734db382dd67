use crate::audio_device::negotiation::{DeviceSpec, StreamRequest};
use crate::error::{DeviceResult, EngineResult};
use crate::rt_processing::callback::CallbackSlot;

/// The host audio subsystem, as seen by a session.
///
/// A host negotiates a stream, then calls `CallbackSlot::process_realtime`
/// from its own thread whenever it needs another buffer. Devices open paused.
pub trait AudioHost {
    /// Agree on the parameters the stream will run with. The result may
    /// differ from the request.
    fn negotiate(&mut self, request: &StreamRequest) -> EngineResult<DeviceSpec>;

    /// Open a paused output stream feeding from `slot`.
    fn open(&mut self, spec: &DeviceSpec, slot: CallbackSlot) -> DeviceResult<()>;

    fn set_paused(&mut self, paused: bool) -> DeviceResult<()>;

    /// Release the device. No callback starts after this returns.
    fn close(&mut self);
}
