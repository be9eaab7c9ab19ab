//! Presentation-side notifications.
//!
//! Observers run on their own task so a slow UI never stalls configuration or
//! frame delivery. Rate updates are tagged with the session epoch that
//! produced them; once a session is stopped its epoch is retired and any of
//! its rate updates still queued are dropped.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CaptureError;
use crate::state::SessionState;

/// Pixel rectangle the UI renders the live preview into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSurface {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// Receives session notifications on the presentation task.
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, _state: &SessionState) {}

    fn on_rate_update(&self, _fps: u32) {}

    /// A runtime error that was not recovered automatically.
    fn on_runtime_error(&self, _error: &CaptureError) {}

    fn on_preview_attached(&self, _surface: PreviewSurface) {}

    fn on_orientation_changed(&self, _orientation: VideoOrientation) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

enum PresentationEvent {
    StateChanged(SessionState),
    RateUpdated { epoch: u64, fps: u32 },
    RuntimeError(CaptureError),
    PreviewAttached(PreviewSurface),
    OrientationChanged(VideoOrientation),
}

/// Handle for posting notifications to the presentation task.
#[derive(Clone)]
pub(crate) struct Presenter {
    tx: mpsc::UnboundedSender<PresentationEvent>,
    epoch: Arc<RwLock<u64>>,
}

impl Presenter {
    /// Spawn the presentation task. Must be called inside a tokio runtime.
    pub(crate) fn spawn(observer: Arc<dyn SessionObserver>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(RwLock::new(0));
        tokio::spawn(run_presentation_loop(
            rx,
            observer,
            Arc::clone(&epoch),
            cancel,
        ));
        Self { tx, epoch }
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        *self.epoch.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retire the current epoch. Waits for an in-flight rate callback, so no
    /// rate update from the old epoch reaches the observer after this returns.
    pub(crate) fn retire_epoch(&self) -> u64 {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        *epoch
    }

    pub(crate) fn state_changed(&self, state: SessionState) {
        self.send(PresentationEvent::StateChanged(state));
    }

    pub(crate) fn rate_updated(&self, epoch: u64, fps: u32) {
        self.send(PresentationEvent::RateUpdated { epoch, fps });
    }

    pub(crate) fn runtime_error(&self, error: CaptureError) {
        self.send(PresentationEvent::RuntimeError(error));
    }

    pub(crate) fn preview_attached(&self, surface: PreviewSurface) {
        self.send(PresentationEvent::PreviewAttached(surface));
    }

    pub(crate) fn orientation_changed(&self, orientation: VideoOrientation) {
        self.send(PresentationEvent::OrientationChanged(orientation));
    }

    fn send(&self, event: PresentationEvent) {
        if self.tx.send(event).is_err() {
            debug!("Presentation task gone; dropping notification");
        }
    }
}

async fn run_presentation_loop(
    mut rx: mpsc::UnboundedReceiver<PresentationEvent>,
    observer: Arc<dyn SessionObserver>,
    epoch: Arc<RwLock<u64>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            event = rx.recv() => {
                match event {
                    Some(event) => dispatch(observer.as_ref(), &epoch, event),
                    None => break,
                }
            }
            _ = cancel.cancelled() => {
                while let Ok(event) = rx.try_recv() {
                    dispatch(observer.as_ref(), &epoch, event);
                }
                break;
            }
        }
    }
    debug!("Presentation loop finished");
}

fn dispatch(observer: &dyn SessionObserver, epoch: &RwLock<u64>, event: PresentationEvent) {
    match event {
        PresentationEvent::StateChanged(state) => observer.on_state_change(&state),
        PresentationEvent::RateUpdated { epoch: tagged, fps } => {
            let current = epoch.read().unwrap_or_else(PoisonError::into_inner);
            if *current == tagged {
                observer.on_rate_update(fps);
            }
        }
        PresentationEvent::RuntimeError(error) => observer.on_runtime_error(&error),
        PresentationEvent::PreviewAttached(surface) => observer.on_preview_attached(surface),
        PresentationEvent::OrientationChanged(orientation) => {
            observer.on_orientation_changed(orientation)
        }
    }
}
