//! Capture session state machine.

use std::fmt;

use crate::error::FailureReason;

/// Lifecycle state of one capture session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Configuring,
    Running,
    Interrupted,
    Failed(FailureReason),
}

impl SessionState {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Failed` may re-enter `Configuring` for an external retry, and both
    /// `Failed` and the active states may be torn down to `Uninitialized`.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Configuring)
                | (Failed(_), Configuring)
                | (Configuring, Running)
                | (Configuring, Failed(_))
                | (Running, Interrupted)
                | (Running, Failed(_))
                | (Running, Uninitialized)
                | (Interrupted, Running)
                | (Interrupted, Failed(_))
                | (Interrupted, Uninitialized)
                | (Failed(_), Uninitialized)
        )
    }

    /// Running or interrupted: the device is owned by the controller.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Interrupted)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            SessionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Configuring => write!(f, "configuring"),
            SessionState::Running => write!(f, "running"),
            SessionState::Interrupted => write!(f, "interrupted"),
            SessionState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Camera access authorization as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

impl PermissionStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, PermissionStatus::NotDetermined)
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, PermissionStatus::Authorized)
    }
}

/// Why the platform suspended capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptionReason {
    /// A higher-priority client took the camera.
    DeviceInUseByAnotherClient,
    NotAvailableInBackground,
    NotAvailableWithMultipleForegroundApps,
    NotAvailableDueToSystemPressure,
    Other(String),
}

impl fmt::Display for InterruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptionReason::DeviceInUseByAnotherClient => {
                write!(f, "device in use by another client")
            }
            InterruptionReason::NotAvailableInBackground => write!(f, "not available in background"),
            InterruptionReason::NotAvailableWithMultipleForegroundApps => {
                write!(f, "not available with multiple foreground apps")
            }
            InterruptionReason::NotAvailableDueToSystemPressure => {
                write!(f, "not available due to system pressure")
            }
            InterruptionReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Cause attached to a session runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorCause {
    /// The platform media services restarted; the session can be started again.
    MediaServicesReset,
    DeviceDisconnected,
    Other(String),
}

impl fmt::Display for RuntimeErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeErrorCause::MediaServicesReset => write!(f, "media services were reset"),
            RuntimeErrorCause::DeviceDisconnected => write!(f, "device disconnected"),
            RuntimeErrorCause::Other(msg) => write!(f, "{}", msg),
        }
    }
}
