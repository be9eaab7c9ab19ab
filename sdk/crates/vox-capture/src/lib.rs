//! Camera capture session management.
//!
//! A [`CaptureController`] acquires a camera, picks the format that best
//! matches a [`DesiredCaptureSpec`], configures the device inside an exclusive
//! transaction, wires it to a [`FrameOutput`] and keeps the session running
//! across interruptions and recoverable runtime errors. Hardware is reached
//! through the traits in [`platform`]; the `native` feature provides a
//! nokhwa-backed implementation and `python` exposes the controller to Python.

pub mod config;
pub mod error;
pub mod format;
pub mod monitor;
pub mod output;
pub mod platform;
pub mod presenter;
pub mod rate;
pub mod session;
pub mod state;

#[cfg(feature = "native")]
pub mod native;
#[cfg(feature = "python")]
mod python;

pub use config::CaptureConfig;
pub use error::{CaptureError, DeviceError, FailureReason, Result, SessionComponent};
pub use format::{select_format, CaptureFormat, DesiredCaptureSpec, FrameRateRange};
pub use monitor::{classify, Recovery};
pub use output::{CaptureStats, Frame, FrameConsumer, FrameOutput};
pub use platform::{
    CaptureDevice, CapturePlatform, CaptureSession, ConfigurationLock, DeviceChange,
    DevicePosition, SessionConfiguration, SessionEvent,
};
pub use presenter::{NoopObserver, PreviewSurface, SessionObserver, VideoOrientation};
pub use rate::{FrameRateCounter, FrameRateSnapshot, RATE_WINDOW};
pub use session::{CaptureController, ControllerBuilder, WeakController};
pub use state::{InterruptionReason, PermissionStatus, RuntimeErrorCause, SessionState};
