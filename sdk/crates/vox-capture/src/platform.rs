//! Seams to the platform camera subsystem.
//!
//! The controller only talks to hardware through these traits. A platform
//! hands out devices and sessions; a device advertises formats and accepts
//! property writes while it is locked for configuration; a session wires one
//! device input to one frame output and reports runtime events on a channel
//! scoped to that session instance.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DeviceError;
use crate::format::CaptureFormat;
use crate::output::FrameOutput;
use crate::state::{InterruptionReason, RuntimeErrorCause};

/// Physical placement of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevicePosition {
    Back,
    Front,
    External,
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePosition::Back => write!(f, "back"),
            DevicePosition::Front => write!(f, "front"),
            DevicePosition::External => write!(f, "external"),
        }
    }
}

/// A single property write applied inside a configuration lock.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceChange {
    SmoothAutoFocus(bool),
    ActiveFormat(CaptureFormat),
    FrameDuration { min: Duration, max: Duration },
}

/// A camera exposed by the platform.
///
/// Changes passed to [`CaptureDevice::apply`] are staged and become visible
/// when [`CaptureDevice::unlock_for_configuration`] commits them. Callers go
/// through [`ConfigurationLock`] rather than calling the lock pair directly.
pub trait CaptureDevice: Send + Sync {
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn position(&self) -> DevicePosition;

    /// Formats in the order the hardware advertises them.
    fn formats(&self) -> Vec<CaptureFormat>;

    fn active_format(&self) -> Option<CaptureFormat>;

    fn supports_smooth_autofocus(&self) -> bool {
        false
    }

    fn lock_for_configuration(&self) -> Result<(), DeviceError>;

    /// Commit staged changes and release the lock.
    fn unlock_for_configuration(&self);

    fn apply(&self, change: DeviceChange) -> Result<(), DeviceError>;
}

/// Exclusive configuration transaction on a device.
///
/// Writes are only possible through the guard; dropping it commits and
/// releases the device lock on every exit path.
pub struct ConfigurationLock<'a> {
    device: &'a dyn CaptureDevice,
}

impl<'a> ConfigurationLock<'a> {
    pub fn acquire(device: &'a dyn CaptureDevice) -> Result<Self, DeviceError> {
        device.lock_for_configuration()?;
        debug!("Locked {} for configuration", device.unique_id());
        Ok(Self { device })
    }

    pub fn set_smooth_autofocus(&self, enabled: bool) -> Result<(), DeviceError> {
        self.device.apply(DeviceChange::SmoothAutoFocus(enabled))
    }

    pub fn set_active_format(&self, format: &CaptureFormat) -> Result<(), DeviceError> {
        self.device.apply(DeviceChange::ActiveFormat(format.clone()))
    }

    pub fn set_frame_duration(&self, min: Duration, max: Duration) -> Result<(), DeviceError> {
        self.device.apply(DeviceChange::FrameDuration { min, max })
    }

    pub fn device(&self) -> &dyn CaptureDevice {
        self.device
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        debug!("Committed configuration for {}", self.device.unique_id());
    }
}

/// Runtime notifications from a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RuntimeError(RuntimeErrorCause),
    InterruptionStarted(InterruptionReason),
    InterruptionEnded,
}

/// The pipeline object that couples one device input to one frame output.
pub trait CaptureSession: Send {
    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    fn can_add_input(&self, device: &dyn CaptureDevice) -> bool;

    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<(), DeviceError>;

    fn can_add_output(&self, output: &FrameOutput) -> bool;

    fn add_output(&mut self, output: FrameOutput) -> Result<(), DeviceError>;

    /// Detach every input and output.
    fn remove_all(&mut self);

    fn start_running(&mut self) -> Result<(), DeviceError>;

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;

    /// Take the event stream for this session instance. Returns `None` once
    /// the stream has already been taken.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>>;
}

/// Batched session reconfiguration, committed when dropped.
pub struct SessionConfiguration<'a> {
    session: &'a mut (dyn CaptureSession + 'static),
}

impl<'a> SessionConfiguration<'a> {
    pub fn begin(session: &'a mut (dyn CaptureSession + 'static)) -> Self {
        session.begin_configuration();
        Self { session }
    }
}

impl Deref for SessionConfiguration<'_> {
    type Target = dyn CaptureSession + 'static;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl DerefMut for SessionConfiguration<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl Drop for SessionConfiguration<'_> {
    fn drop(&mut self) {
        self.session.commit_configuration();
    }
}

/// Source of capture devices and sessions.
pub trait CapturePlatform: Send + Sync {
    /// The default device at `position`, if one exists.
    fn default_device(&self, position: DevicePosition) -> Option<Arc<dyn CaptureDevice>>;

    /// Every device the platform can see, for diagnostics.
    fn devices(&self) -> Vec<Arc<dyn CaptureDevice>>;

    fn new_session(&self) -> Box<dyn CaptureSession>;
}
