//! Runtime error and interruption handling for a running session.
//!
//! One monitor is spawned per session instance and listens only to that
//! instance's event stream. It is cancelled when the session is stopped, so
//! observers never outlive the session they were registered for.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::SessionEvent;
use crate::session::WeakController;
use crate::state::{RuntimeErrorCause, SessionState};

/// What to do about a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Restart the session without reconfiguring it
    Restart,
    /// Surface the error and leave recovery to the user
    Report,
}

/// Only a media services reset is recovered automatically.
pub fn classify(cause: &RuntimeErrorCause) -> Recovery {
    match cause {
        RuntimeErrorCause::MediaServicesReset => Recovery::Restart,
        RuntimeErrorCause::DeviceDisconnected | RuntimeErrorCause::Other(_) => Recovery::Report,
    }
}

pub(crate) struct InterruptionMonitor {
    controller: WeakController,
    session: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancellationToken,
}

impl InterruptionMonitor {
    pub(crate) fn new(
        controller: WeakController,
        session: u64,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            controller,
            session,
            events,
            cancel,
        }
    }

    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => {
                    match event {
                        Some(event) => {
                            if !self.handle(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        debug!("Monitor for session {} finished", self.session);
    }

    /// Returns `false` once the controller is gone.
    async fn handle(&self, event: SessionEvent) -> bool {
        let Some(controller) = self.controller.upgrade() else {
            return false;
        };
        match event {
            SessionEvent::RuntimeError(cause) => {
                warn!("Capture session runtime error: {}", cause);
                let running = controller.state() == SessionState::Running;
                match classify(&cause) {
                    Recovery::Restart if running => {
                        info!("Restarting capture session after {}", cause);
                        if let Err(err) = controller.restart_session(self.session).await {
                            warn!("Automatic restart failed: {}", err);
                        }
                    }
                    _ => controller.report_session_error(self.session, cause),
                }
            }
            SessionEvent::InterruptionStarted(reason) => {
                controller.interrupt_session(self.session, reason)
            }
            SessionEvent::InterruptionEnded => controller.end_session_interruption(self.session),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_media_reset_restarts() {
        assert_eq!(
            classify(&RuntimeErrorCause::MediaServicesReset),
            Recovery::Restart
        );
        assert_eq!(
            classify(&RuntimeErrorCause::DeviceDisconnected),
            Recovery::Report
        );
        assert_eq!(
            classify(&RuntimeErrorCause::Other("sensor fault".into())),
            Recovery::Report
        );
    }
}
