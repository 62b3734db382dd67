//! Realtime side of tonescope: hosts, the fill engine and the session that
//! ties them together.

pub mod audio_device;
pub mod error;
pub mod rt_processing;
pub mod session;

pub use audio_device::cpal_host::CpalHost;
pub use audio_device::host::AudioHost;
pub use audio_device::manual::{ManualDriver, ManualHost};
pub use audio_device::negotiation::{DeviceCapabilities, DeviceSpec, StreamRequest};
pub use error::{DeviceError, Diagnostic, EngineError, EngineResult};
pub use rt_processing::commands::{ControlCommand, ControlEvent};
pub use rt_processing::display_buffer::{DisplayBuffer, DisplaySnapshot};
pub use rt_processing::performance::PerformanceSnapshot;
pub use session::{EngineState, Session};
