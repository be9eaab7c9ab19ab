//! Capture session controller.
//!
//! All configuration work (device acquisition, format selection, device
//! transactions, session wiring, start and stop) runs on one task that drains
//! a FIFO command queue, so hardware configuration is never interleaved. The
//! [`CaptureController`] handle only enqueues commands and reads published
//! state.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, DeviceError, Result, SessionComponent};
use crate::format::{select_format, CaptureFormat};
use crate::monitor::InterruptionMonitor;
use crate::output::{CaptureStats, Delivery, Frame, FrameConsumer, FrameOutput, StatsInner};
use crate::platform::{
    CaptureDevice, CapturePlatform, CaptureSession, ConfigurationLock, SessionConfiguration,
};
use crate::presenter::{NoopObserver, Presenter, PreviewSurface, SessionObserver, VideoOrientation};
use crate::rate::FrameRateCounter;
use crate::state::{InterruptionReason, PermissionStatus, RuntimeErrorCause, SessionState};

/// Commands processed by the session-configuration loop.
///
/// `session` names the session instance a command was raised for. Commands
/// tagged with an instance that is no longer active are dropped; `None`
/// targets whichever session is current.
enum Command {
    Configure(oneshot::Sender<Result<()>>),
    Start {
        session: Option<u64>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop(oneshot::Sender<()>),
    Interrupt {
        session: Option<u64>,
        reason: InterruptionReason,
    },
    EndInterruption {
        session: Option<u64>,
    },
    ReportRuntimeError {
        session: Option<u64>,
        cause: RuntimeErrorCause,
    },
}

/// State shared by every handle to one controller.
struct ControllerShared {
    state: watch::Receiver<SessionState>,
    active_format: watch::Receiver<Option<CaptureFormat>>,
    session: watch::Receiver<Option<u64>>,
    counter: Arc<FrameRateCounter>,
    stats: Arc<StatsInner>,
    presenter: Presenter,
    cancel: CancellationToken,
}

/// Handle to a capture session controller.
///
/// Cheap to clone. Every clone talks to the same configuration loop.
#[derive(Clone)]
pub struct CaptureController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<ControllerShared>,
}

/// Non-owning handle that does not keep the configuration loop alive.
#[derive(Clone)]
pub struct WeakController {
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    shared: Arc<ControllerShared>,
}

impl WeakController {
    pub fn upgrade(&self) -> Option<CaptureController> {
        self.cmd_tx.upgrade().map(|cmd_tx| CaptureController {
            cmd_tx,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Builder for [`CaptureController`].
pub struct ControllerBuilder {
    platform: Arc<dyn CapturePlatform>,
    config: CaptureConfig,
    consumer: Arc<dyn FrameConsumer>,
    observer: Arc<dyn SessionObserver>,
    permission: Option<watch::Receiver<PermissionStatus>>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Downstream consumer for captured frames.
    pub fn consumer(mut self, consumer: Arc<dyn FrameConsumer>) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Camera permission feed. Until it resolves, queued commands wait.
    /// Without one, access is treated as authorized.
    pub fn permission(mut self, permission: watch::Receiver<PermissionStatus>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Spawn the configuration and presentation tasks. Must be called from
    /// within a tokio runtime.
    pub fn spawn(self) -> CaptureController {
        let cancel = CancellationToken::new();
        let presenter = Presenter::spawn(self.observer, cancel.child_token());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);
        let (format_tx, format_rx) = watch::channel(None);
        let (session_tx, session_rx) = watch::channel(None);
        let counter = Arc::new(FrameRateCounter::new());
        let stats = Arc::new(StatsInner::default());

        let permission = self
            .permission
            .unwrap_or_else(|| watch::channel(PermissionStatus::Authorized).1);

        let controller = CaptureController {
            cmd_tx,
            shared: Arc::new(ControllerShared {
                state: state_rx,
                active_format: format_rx,
                session: session_rx,
                counter: Arc::clone(&counter),
                stats: Arc::clone(&stats),
                presenter: presenter.clone(),
                cancel: cancel.clone(),
            }),
        };

        let session_loop = SessionLoop {
            config: self.config,
            platform: self.platform,
            consumer: self.consumer,
            permission,
            state_tx,
            format_tx,
            session_tx,
            counter,
            stats,
            presenter,
            controller: controller.downgrade(),
            cancel,
            next_session: 0,
            active: None,
        };
        tokio::spawn(session_loop.run(cmd_rx));

        controller
    }
}

impl CaptureController {
    pub fn builder(platform: Arc<dyn CapturePlatform>) -> ControllerBuilder {
        let consumer: Arc<dyn FrameConsumer> = Arc::new(|_: &Frame| {});
        ControllerBuilder {
            platform,
            config: CaptureConfig::default(),
            consumer,
            observer: Arc::new(NoopObserver),
            permission: None,
        }
    }

    /// Acquire a device, apply the best format and start the session.
    ///
    /// Configuration-time failures leave the session in `Failed` and are
    /// never retried automatically.
    pub async fn configure(&self) -> Result<()> {
        self.request(Command::Configure).await?
    }

    /// Make sure a running session is delivering frames. Idempotent while
    /// running; also used to restart a session stopped by a runtime error.
    pub async fn start(&self) -> Result<()> {
        self.request(|reply| Command::Start {
            session: None,
            reply,
        })
        .await?
    }

    /// Detach the output and observers, release the device and return to
    /// `Uninitialized`. No frame or rate callback fires after this returns.
    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Mark the running session as interrupted.
    pub fn interrupt(&self, reason: InterruptionReason) {
        self.send(Command::Interrupt {
            session: None,
            reason,
        });
    }

    /// Resume after an interruption, if the session was running before it.
    pub fn end_interruption(&self) {
        self.send(Command::EndInterruption { session: None });
    }

    /// Surface a runtime error that will not be recovered automatically.
    pub fn report_runtime_error(&self, cause: RuntimeErrorCause) {
        self.send(Command::ReportRuntimeError {
            session: None,
            cause,
        });
    }

    /// Id of the configured session instance. A new id is issued by every
    /// successful `configure()`.
    pub fn session_id(&self) -> Option<u64> {
        *self.shared.session.borrow()
    }

    pub(crate) async fn restart_session(&self, session: u64) -> Result<()> {
        self.request(|reply| Command::Start {
            session: Some(session),
            reply,
        })
        .await?
    }

    pub(crate) fn interrupt_session(&self, session: u64, reason: InterruptionReason) {
        self.send(Command::Interrupt {
            session: Some(session),
            reason,
        });
    }

    pub(crate) fn end_session_interruption(&self, session: u64) {
        self.send(Command::EndInterruption {
            session: Some(session),
        });
    }

    pub(crate) fn report_session_error(&self, session: u64, cause: RuntimeErrorCause) {
        self.send(Command::ReportRuntimeError {
            session: Some(session),
            cause,
        });
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.clone()
    }

    /// Frames delivered within the last second.
    pub fn frame_rate(&self) -> u32 {
        self.shared.counter.current_rate()
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.stats.to_stats()
    }

    pub fn active_format(&self) -> Option<CaptureFormat> {
        self.shared.active_format.borrow().clone()
    }

    pub fn attach_preview(&self, surface: PreviewSurface) {
        self.shared.presenter.preview_attached(surface);
    }

    pub fn notify_orientation_changed(&self, orientation: VideoOrientation) {
        self.shared.presenter.orientation_changed(orientation);
    }

    /// Stop the session and end the controller's tasks.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController {
            cmd_tx: self.cmd_tx.downgrade(),
            shared: Arc::clone(&self.shared),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| CaptureError::ControllerClosed)?;
        rx.await.map_err(|_| CaptureError::ControllerClosed)
    }

    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Capture controller closed; dropping command");
        }
    }
}

/// Resources owned while a session is configured.
struct ActiveSession {
    id: u64,
    session: Box<dyn CaptureSession>,
    device: Arc<dyn CaptureDevice>,
    output: FrameOutput,
    monitor: CancellationToken,
    interruption: Option<InterruptionReason>,
}

/// The session-configuration context.
struct SessionLoop {
    config: CaptureConfig,
    platform: Arc<dyn CapturePlatform>,
    consumer: Arc<dyn FrameConsumer>,
    permission: watch::Receiver<PermissionStatus>,
    state_tx: watch::Sender<SessionState>,
    format_tx: watch::Sender<Option<CaptureFormat>>,
    session_tx: watch::Sender<Option<u64>>,
    counter: Arc<FrameRateCounter>,
    stats: Arc<StatsInner>,
    presenter: Presenter,
    controller: WeakController,
    cancel: CancellationToken,
    next_session: u64,
    active: Option<ActiveSession>,
}

impl SessionLoop {
    /// Device and session calls block, so each command runs on the blocking
    /// pool. The loop owns `self` between commands and hands it over for the
    /// duration of one command, which keeps them strictly sequential.
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let cancel = self.cancel.clone();
        if self.await_permission().await {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Capture controller cancelled");
                        break;
                    }
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        match tokio::task::spawn_blocking(move || {
                            self.handle(cmd);
                            self
                        })
                        .await
                        {
                            Ok(this) => self = this,
                            Err(err) => {
                                error!("Capture command panicked: {}", err);
                                return;
                            }
                        }
                    }
                }
            }
        }
        if let Err(err) = tokio::task::spawn_blocking(move || self.teardown()).await {
            error!("Capture session teardown panicked: {}", err);
        }
    }

    /// Hold the queue until camera permission is resolved. Returns `false`
    /// when cancelled first.
    async fn await_permission(&mut self) -> bool {
        if self.permission.borrow().is_resolved() {
            return true;
        }
        info!("Camera permission not determined; holding configuration queue");
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            resolved = self.permission.wait_for(|status| status.is_resolved()) => {
                match resolved.map(|status| *status) {
                    Ok(status) => info!("Camera permission resolved: {:?}", status),
                    Err(_) => warn!("Permission source closed before resolving"),
                }
                true
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Configure(reply) => {
                let _ = reply.send(self.configure());
            }
            Command::Start { session, reply } => {
                let result = if self.is_current(session) {
                    self.start()
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(());
            }
            Command::Interrupt { session, reason } => {
                if self.is_current(session) {
                    self.interrupt(reason);
                }
            }
            Command::EndInterruption { session } => {
                if self.is_current(session) {
                    self.end_interruption();
                }
            }
            Command::ReportRuntimeError { session, cause } => {
                if self.is_current(session) {
                    self.report_runtime_error(cause);
                }
            }
        }
    }

    /// Whether a command tagged with `session` still applies.
    fn is_current(&self, session: Option<u64>) -> bool {
        let Some(id) = session else {
            return true;
        };
        let current = self.active.as_ref().map(|active| active.id);
        if current != Some(id) {
            debug!("Dropping command for stale session {} (current {:?})", id, current);
            return false;
        }
        true
    }

    fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(&next) {
            warn!("Rejected session transition {} -> {}", current, next);
            return Err(CaptureError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        info!("Capture session {} -> {}", current, next);
        self.state_tx.send_replace(next.clone());
        self.presenter.state_changed(next);
        Ok(())
    }

    /// Record a configuration-time error in the state machine.
    fn fail(&mut self, err: CaptureError) -> CaptureError {
        if let Some(reason) = err.failure_reason() {
            if let Err(transition_err) = self.transition(SessionState::Failed(reason)) {
                warn!("Could not record failure: {}", transition_err);
            }
        }
        err
    }

    fn configure(&mut self) -> Result<()> {
        let state = self.state();
        if state.is_active() || state == SessionState::Configuring {
            return Err(CaptureError::AlreadyConfigured);
        }
        self.config.validate()?;
        self.transition(SessionState::Configuring)?;

        let permission = *self.permission.borrow();
        if !permission.is_authorized() {
            warn!("Camera access not authorized: {:?}", permission);
            return Err(self.fail(CaptureError::PermissionDenied));
        }

        match self.build_session() {
            Ok(active) => {
                self.active = Some(active);
                if let Err(err) = self.transition(SessionState::Running) {
                    self.release_active();
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => {
                error!("Capture configuration failed: {}", err);
                Err(self.fail(err))
            }
        }
    }

    fn acquire_device(&self) -> Result<Arc<dyn CaptureDevice>> {
        for &position in &self.config.device_preference {
            if let Some(device) = self.platform.default_device(position) {
                info!("Using {} camera {}", position, device.name());
                return Ok(device);
            }
            debug!("No {} camera available", position);
        }
        let visible: Vec<String> = self
            .platform
            .devices()
            .iter()
            .map(|device| format!("{} ({})", device.name(), device.position()))
            .collect();
        warn!(
            "No camera matches preference {:?}; visible: [{}]",
            self.config.device_preference,
            visible.join(", ")
        );
        Err(CaptureError::DeviceUnavailable)
    }

    /// Apply format and frame pacing inside one device transaction. The lock
    /// is released (and staged writes committed) on every return path.
    fn configure_device(&self, device: &dyn CaptureDevice) -> Result<CaptureFormat> {
        let desired = self.config.desired;
        let lock = ConfigurationLock::acquire(device).map_err(|err| match err {
            DeviceError::Locked(msg) => CaptureError::DeviceLocked(msg),
            other => CaptureError::Device(other),
        })?;

        let formats = device.formats();
        let Some(format) = select_format(&formats, &desired).cloned() else {
            warn!(
                "No format on {} matches {} ({} advertised)",
                device.name(),
                desired,
                formats.len()
            );
            return Err(CaptureError::FormatUnsupported {
                width: desired.width,
                height: desired.height,
                fps: desired.target_fps,
            });
        };

        if self.config.disable_smooth_autofocus && lock.device().supports_smooth_autofocus() {
            lock.set_smooth_autofocus(false)?;
        }
        lock.set_active_format(&format)?;
        let interval = desired.frame_interval();
        lock.set_frame_duration(interval, interval)?;

        info!("Selected {} for requested {}", format, desired);
        Ok(format)
    }

    fn wire_session(
        &self,
        wiring: &mut SessionConfiguration<'_>,
        device: &Arc<dyn CaptureDevice>,
        output: &FrameOutput,
    ) -> Result<CaptureFormat> {
        let format = self.configure_device(device.as_ref())?;

        if !wiring.can_add_input(device.as_ref()) {
            return Err(CaptureError::SessionRejected {
                component: SessionComponent::Input,
            });
        }
        wiring.add_input(Arc::clone(device)).map_err(|err| {
            warn!("Session refused input: {}", err);
            CaptureError::SessionRejected {
                component: SessionComponent::Input,
            }
        })?;

        if !wiring.can_add_output(output) {
            return Err(CaptureError::SessionRejected {
                component: SessionComponent::Output,
            });
        }
        wiring.add_output(output.clone()).map_err(|err| {
            warn!("Session refused output: {}", err);
            CaptureError::SessionRejected {
                component: SessionComponent::Output,
            }
        })?;

        Ok(format)
    }

    fn build_session(&mut self) -> Result<ActiveSession> {
        let device = self.acquire_device()?;
        let mut session = self.platform.new_session();
        let output = FrameOutput::new(Arc::clone(&self.stats));

        let wired = {
            let mut wiring = SessionConfiguration::begin(session.as_mut());
            self.wire_session(&mut wiring, &device, &output)
        };
        let format = match wired {
            Ok(format) => format,
            Err(err) => {
                session.remove_all();
                return Err(err);
            }
        };

        // Still configuring: nothing is published until the session runs.
        if let Err(err) = session.start_running() {
            error!("Session failed to start: {}", err);
            session.remove_all();
            return Err(match err {
                DeviceError::Locked(msg) => CaptureError::DeviceLocked(msg),
                other => CaptureError::StartFailed(other.to_string()),
            });
        }

        let id = self.next_session;
        self.next_session += 1;

        let monitor = self.cancel.child_token();
        match session.take_events() {
            Some(events) => {
                InterruptionMonitor::new(self.controller.clone(), id, events, monitor.clone())
                    .spawn();
            }
            None => warn!("Session exposes no event stream; interruptions are not tracked"),
        }

        self.counter.reset();
        output.open(Delivery {
            consumer: Arc::clone(&self.consumer),
            counter: Arc::clone(&self.counter),
            presenter: self.presenter.clone(),
            epoch: self.presenter.current_epoch(),
            target_fps: self.config.desired.target_fps,
            rate_tolerance: self.config.rate_tolerance,
        });
        self.format_tx.send_replace(Some(format));
        self.session_tx.send_replace(Some(id));

        Ok(ActiveSession {
            id,
            session,
            device,
            output,
            monitor,
            interruption: None,
        })
    }

    fn start(&mut self) -> Result<()> {
        let state = self.state();
        let Some(active) = self.active.as_mut() else {
            return Err(CaptureError::NotConfigured);
        };
        match state {
            SessionState::Running => {
                if active.session.is_running() {
                    debug!("Capture session already running");
                    return Ok(());
                }
                info!("Restarting capture session");
                let result = active.session.start_running();
                result.or_else(|err| self.escalate(err))
            }
            SessionState::Interrupted => Err(CaptureError::InvalidTransition {
                from: SessionState::Interrupted,
                to: SessionState::Running,
            }),
            _ => Err(CaptureError::NotConfigured),
        }
    }

    /// A failed recovery becomes a configuration-time failure.
    fn escalate(&mut self, err: DeviceError) -> Result<()> {
        error!("Capture session recovery failed: {}", err);
        self.release_active();
        Err(self.fail(CaptureError::RecoveryFailed(err.to_string())))
    }

    fn stop(&mut self) {
        let state = self.state();
        self.release_active();
        match state {
            SessionState::Uninitialized => debug!("Stop requested while uninitialized"),
            _ => {
                if let Err(err) = self.transition(SessionState::Uninitialized) {
                    warn!("Stop could not reset session state: {}", err);
                }
            }
        }
    }

    /// Detach output and observers, stop the session and release the device.
    fn release_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.output.close();
        self.presenter.retire_epoch();
        active.monitor.cancel();
        active.session.stop_running();
        active.session.remove_all();
        self.format_tx.send_replace(None);
        self.session_tx.send_replace(None);
        info!("Released camera {} (session {})", active.device.name(), active.id);
    }

    fn interrupt(&mut self, reason: InterruptionReason) {
        let state = self.state();
        if state != SessionState::Running {
            debug!("Ignoring interruption ({}) while {}", reason, state);
            return;
        }
        info!("Capture session interrupted: {}", reason);
        if let Some(active) = self.active.as_mut() {
            active.interruption = Some(reason);
        }
        if let Err(err) = self.transition(SessionState::Interrupted) {
            warn!("Could not record interruption: {}", err);
        }
    }

    fn end_interruption(&mut self) {
        let state = self.state();
        if state != SessionState::Interrupted {
            debug!("Ignoring interruption end while {}", state);
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(reason) = active.interruption.take() {
            info!("Interruption ended ({})", reason);
        }
        let result = if active.session.is_running() {
            Ok(())
        } else {
            active.session.start_running()
        };
        match result {
            Ok(()) => {
                if let Err(err) = self.transition(SessionState::Running) {
                    warn!("Could not resume session: {}", err);
                }
            }
            Err(err) => {
                let _ = self.escalate(err);
            }
        }
    }

    fn report_runtime_error(&mut self, cause: RuntimeErrorCause) {
        let err = CaptureError::Runtime(cause);
        warn!("Capture session runtime error: {}", err);
        self.presenter.runtime_error(err);
    }

    fn teardown(&mut self) {
        self.release_active();
        if self.state().is_active() {
            let _ = self.transition(SessionState::Uninitialized);
        }
        debug!("Capture session loop finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FrameRateRange;
    use crate::platform::{DeviceChange, DevicePosition, SessionEvent};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedDevice;

    impl CaptureDevice for FixedDevice {
        fn unique_id(&self) -> &str {
            "fixed"
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn position(&self) -> DevicePosition {
            DevicePosition::Back
        }

        fn formats(&self) -> Vec<CaptureFormat> {
            vec![CaptureFormat::new(1280, 720, vec![FrameRateRange::new(1.0, 60.0)])]
        }

        fn active_format(&self) -> Option<CaptureFormat> {
            None
        }

        fn lock_for_configuration(&self) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn unlock_for_configuration(&self) {}

        fn apply(&self, _change: DeviceChange) -> std::result::Result<(), DeviceError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FixedSession {
        running: AtomicBool,
    }

    impl CaptureSession for FixedSession {
        fn begin_configuration(&mut self) {}

        fn commit_configuration(&mut self) {}

        fn can_add_input(&self, _device: &dyn CaptureDevice) -> bool {
            true
        }

        fn add_input(&mut self, _device: Arc<dyn CaptureDevice>) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn can_add_output(&self, _output: &FrameOutput) -> bool {
            true
        }

        fn add_output(&mut self, _output: FrameOutput) -> std::result::Result<(), DeviceError> {
            Ok(())
        }

        fn remove_all(&mut self) {}

        fn start_running(&mut self) -> std::result::Result<(), DeviceError> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop_running(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
            None
        }
    }

    struct FixedPlatform;

    impl CapturePlatform for FixedPlatform {
        fn default_device(&self, _position: DevicePosition) -> Option<Arc<dyn CaptureDevice>> {
            Some(Arc::new(FixedDevice))
        }

        fn devices(&self) -> Vec<Arc<dyn CaptureDevice>> {
            vec![Arc::new(FixedDevice)]
        }

        fn new_session(&self) -> Box<dyn CaptureSession> {
            Box::new(FixedSession::default())
        }
    }

    #[tokio::test]
    async fn test_commands_for_replaced_session_are_dropped() {
        let controller = CaptureController::builder(Arc::new(FixedPlatform)).spawn();

        controller.configure().await.unwrap();
        let old = controller.session_id().unwrap();
        controller.stop().await.unwrap();
        assert_eq!(controller.session_id(), None);

        controller.configure().await.unwrap();
        let current = controller.session_id().unwrap();
        assert_ne!(old, current);

        controller.interrupt_session(old, InterruptionReason::DeviceInUseByAnotherClient);
        controller.report_session_error(old, RuntimeErrorCause::MediaServicesReset);
        controller.restart_session(old).await.unwrap();
        assert_eq!(controller.state(), SessionState::Running);

        controller.interrupt_session(current, InterruptionReason::DeviceInUseByAnotherClient);
        controller.start().await.unwrap_err();
        assert_eq!(controller.state(), SessionState::Interrupted);

        controller.end_session_interruption(current);
        controller.stop().await.unwrap();
        assert_eq!(controller.state(), SessionState::Uninitialized);
    }
}
