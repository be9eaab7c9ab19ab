//! Error types for the capture pipeline.

use std::fmt;

use thiserror::Error;

use crate::state::{RuntimeErrorCause, SessionState};

/// Result type alias using CaptureError
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Session component rejected while wiring the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionComponent {
    Input,
    Output,
}

impl fmt::Display for SessionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionComponent::Input => write!(f, "input"),
            SessionComponent::Output => write!(f, "output"),
        }
    }
}

/// Why a session landed in `SessionState::Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Camera access was declined.
    PermissionDenied,
    /// No usable capture device was found.
    DeviceUnavailable,
    /// The device is held by another client and could not be locked.
    DeviceLocked,
    /// No format matches the requested dimensions and frame rate.
    FormatUnsupported,
    /// The session refused an input or output.
    SessionRejected(SessionComponent),
    /// The wired session could not be started.
    StartFailed,
    /// A runtime recovery attempt could not restart the session.
    RecoveryFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PermissionDenied => write!(f, "permission denied"),
            FailureReason::DeviceUnavailable => write!(f, "device unavailable"),
            FailureReason::DeviceLocked => write!(f, "device locked"),
            FailureReason::FormatUnsupported => write!(f, "format unsupported"),
            FailureReason::SessionRejected(component) => {
                write!(f, "session rejected {}", component)
            }
            FailureReason::StartFailed => write!(f, "session failed to start"),
            FailureReason::RecoveryFailed => write!(f, "recovery failed"),
        }
    }
}

/// Errors reported by a platform capture device or session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device is locked by another client: {0}")]
    Locked(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("unsupported device operation: {0}")]
    Unsupported(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Capture pipeline errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("camera access denied")]
    PermissionDenied,

    #[error("no usable capture device found")]
    DeviceUnavailable,

    #[error("capture device is locked: {0}")]
    DeviceLocked(String),

    #[error("no capture format matches {width}x{height} @ {fps}fps")]
    FormatUnsupported { width: u32, height: u32, fps: u32 },

    #[error("session rejected {component}")]
    SessionRejected { component: SessionComponent },

    #[error("session failed to start: {0}")]
    StartFailed(String),

    #[error("session failed to restart: {0}")]
    RecoveryFailed(String),

    #[error("runtime error: {0}")]
    Runtime(RuntimeErrorCause),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("session is not configured")]
    NotConfigured,

    #[error("session is already configured")]
    AlreadyConfigured,

    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("capture controller has shut down")]
    ControllerClosed,
}

impl CaptureError {
    /// The failure reason recorded in the session state for configuration-time errors.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            CaptureError::PermissionDenied => Some(FailureReason::PermissionDenied),
            CaptureError::DeviceUnavailable => Some(FailureReason::DeviceUnavailable),
            CaptureError::DeviceLocked(_) => Some(FailureReason::DeviceLocked),
            CaptureError::FormatUnsupported { .. } => Some(FailureReason::FormatUnsupported),
            CaptureError::SessionRejected { component } => {
                Some(FailureReason::SessionRejected(*component))
            }
            CaptureError::StartFailed(_) => Some(FailureReason::StartFailed),
            CaptureError::RecoveryFailed(_) => Some(FailureReason::RecoveryFailed),
            CaptureError::Device(DeviceError::Locked(_)) => Some(FailureReason::DeviceLocked),
            CaptureError::Device(DeviceError::Disconnected) => {
                Some(FailureReason::DeviceUnavailable)
            }
            CaptureError::Device(_) => Some(FailureReason::DeviceUnavailable),
            _ => None,
        }
    }

    /// Whether this error ends the current configuration attempt.
    pub fn is_terminal(&self) -> bool {
        self.failure_reason().is_some()
    }
}

impl From<DeviceError> for FailureReason {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Locked(_) => FailureReason::DeviceLocked,
            _ => FailureReason::DeviceUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_mapping() {
        let err = CaptureError::FormatUnsupported {
            width: 1280,
            height: 720,
            fps: 60,
        };
        assert_eq!(err.failure_reason(), Some(FailureReason::FormatUnsupported));

        let err = CaptureError::Device(DeviceError::Locked("other app".into()));
        assert_eq!(err.failure_reason(), Some(FailureReason::DeviceLocked));

        let err = CaptureError::StartFailed("stream refused".into());
        assert_eq!(err.failure_reason(), Some(FailureReason::StartFailed));

        assert_eq!(CaptureError::NotConfigured.failure_reason(), None);
        assert!(!CaptureError::ControllerClosed.is_terminal());
    }

    #[test]
    fn test_error_display() {
        let err = CaptureError::FormatUnsupported {
            width: 1280,
            height: 720,
            fps: 60,
        };
        assert_eq!(err.to_string(), "no capture format matches 1280x720 @ 60fps");

        let err = CaptureError::SessionRejected {
            component: SessionComponent::Output,
        };
        assert_eq!(err.to_string(), "session rejected output");
    }
}
