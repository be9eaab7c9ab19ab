//! Capture Testing Utilities
//!
//! Mock platform, device and session for driving the controller without
//! camera hardware. Sessions expose a shared handle so tests can inject
//! runtime events and emit frames as the platform's delivery thread would.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use vox_capture::{
    CaptureDevice, CaptureError, CaptureFormat, CapturePlatform, CaptureSession, DeviceChange,
    DeviceError, DevicePosition, Frame, FrameOutput, FrameRateRange, PreviewSurface,
    SessionEvent, SessionObserver, SessionState, VideoOrientation,
};

/// Upper bound for every wait in the integration tests
pub const WAIT: Duration = Duration::from_secs(2);

/// Formats in the order a typical phone camera advertises them
pub fn phone_formats() -> Vec<CaptureFormat> {
    vec![
        CaptureFormat::new(1280, 720, vec![FrameRateRange::new(1.0, 30.0)]),
        CaptureFormat::new(1280, 720, vec![FrameRateRange::new(1.0, 60.0)]),
        CaptureFormat::new(1920, 1080, vec![FrameRateRange::new(1.0, 60.0)]),
        CaptureFormat::new(3840, 2160, vec![FrameRateRange::new(1.0, 60.0)]),
    ]
}

#[derive(Default)]
struct DeviceState {
    locked: bool,
    held_elsewhere: bool,
    staged: Vec<DeviceChange>,
    committed: Vec<DeviceChange>,
    locks: usize,
    unlocks: usize,
}

/// Camera that records every committed property write.
pub struct MockDevice {
    id: String,
    position: DevicePosition,
    formats: Vec<CaptureFormat>,
    smooth_autofocus: bool,
    state: Mutex<DeviceState>,
}

impl MockDevice {
    pub fn new(id: &str, position: DevicePosition, formats: Vec<CaptureFormat>) -> Self {
        Self {
            id: id.to_string(),
            position,
            formats,
            smooth_autofocus: false,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn back() -> Arc<Self> {
        Arc::new(Self::new("back-wide", DevicePosition::Back, phone_formats()))
    }

    pub fn front() -> Arc<Self> {
        Arc::new(Self::new("front", DevicePosition::Front, phone_formats()))
    }

    pub fn with_smooth_autofocus(mut self) -> Self {
        self.smooth_autofocus = true;
        self
    }

    pub fn committed(&self) -> Vec<DeviceChange> {
        self.state.lock().unwrap().committed.clone()
    }

    /// Another client holds the configuration lock until released.
    pub fn hold_lock_elsewhere(&self, held: bool) {
        self.state.lock().unwrap().held_elsewhere = held;
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().unwrap().locked
    }

    /// (lock, unlock) call counts
    pub fn lock_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.locks, state.unlocks)
    }
}

impl CaptureDevice for MockDevice {
    fn unique_id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn formats(&self) -> Vec<CaptureFormat> {
        self.formats.clone()
    }

    fn active_format(&self) -> Option<CaptureFormat> {
        self.committed().into_iter().rev().find_map(|change| match change {
            DeviceChange::ActiveFormat(format) => Some(format),
            _ => None,
        })
    }

    fn supports_smooth_autofocus(&self) -> bool {
        self.smooth_autofocus
    }

    fn lock_for_configuration(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.locked || state.held_elsewhere {
            return Err(DeviceError::Locked(self.id.clone()));
        }
        state.locked = true;
        state.locks += 1;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        let mut state = self.state.lock().unwrap();
        let staged = std::mem::take(&mut state.staged);
        state.committed.extend(staged);
        state.locked = false;
        state.unlocks += 1;
    }

    fn apply(&self, change: DeviceChange) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        assert!(state.locked, "property write outside a configuration lock");
        state.staged.push(change);
        Ok(())
    }
}

/// Switches shared by every session a [`MockPlatform`] creates.
#[derive(Default)]
pub struct SessionControls {
    pub reject_input: AtomicBool,
    pub reject_output: AtomicBool,
    pub fail_start: AtomicBool,
}

/// Test-side view of one mock session instance.
pub struct SessionHandle {
    output: Mutex<Option<FrameOutput>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    running: AtomicBool,
    starts: AtomicUsize,
    commits: AtomicUsize,
}

impl SessionHandle {
    /// Push one frame the way the platform's delivery thread would.
    pub fn emit_frame(&self) -> bool {
        let output = self.output.lock().unwrap().clone();
        match output {
            Some(output) => output.deliver(Bytes::from_static(&[0u8; 16]), 4, 4),
            None => false,
        }
    }

    pub fn output(&self) -> Option<FrameOutput> {
        self.output.lock().unwrap().clone()
    }

    pub fn send_event(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Simulate the platform stopping the session on its own.
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    handle: Arc<SessionHandle>,
    controls: Arc<SessionControls>,
    input: Option<Arc<dyn CaptureDevice>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    in_configuration: bool,
}

impl CaptureSession for MockSession {
    fn begin_configuration(&mut self) {
        self.in_configuration = true;
    }

    fn commit_configuration(&mut self) {
        self.in_configuration = false;
        self.handle.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn can_add_input(&self, _device: &dyn CaptureDevice) -> bool {
        self.input.is_none() && !self.controls.reject_input.load(Ordering::SeqCst)
    }

    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<(), DeviceError> {
        assert!(self.in_configuration, "input added outside a configuration batch");
        self.input = Some(device);
        Ok(())
    }

    fn can_add_output(&self, _output: &FrameOutput) -> bool {
        !self.controls.reject_output.load(Ordering::SeqCst)
    }

    fn add_output(&mut self, output: FrameOutput) -> Result<(), DeviceError> {
        assert!(self.in_configuration, "output added outside a configuration batch");
        *self.handle.output.lock().unwrap() = Some(output);
        Ok(())
    }

    fn remove_all(&mut self) {
        self.input = None;
        self.handle.output.lock().unwrap().take();
    }

    fn start_running(&mut self) -> Result<(), DeviceError> {
        if self.controls.fail_start.load(Ordering::SeqCst) {
            return Err(DeviceError::Backend("start refused".into()));
        }
        self.handle.running.store(true, Ordering::SeqCst);
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_running(&mut self) {
        self.handle.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }
}

pub struct MockPlatform {
    devices: Vec<Arc<MockDevice>>,
    pub controls: Arc<SessionControls>,
    sessions: Mutex<Vec<Arc<SessionHandle>>>,
}

impl MockPlatform {
    pub fn new(devices: Vec<Arc<MockDevice>>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            controls: Arc::new(SessionControls::default()),
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn last_session(&self) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().unwrap().last().cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl CapturePlatform for MockPlatform {
    fn default_device(&self, position: DevicePosition) -> Option<Arc<dyn CaptureDevice>> {
        self.devices
            .iter()
            .find(|device| device.position == position)
            .map(|device| Arc::clone(device) as Arc<dyn CaptureDevice>)
    }

    fn devices(&self) -> Vec<Arc<dyn CaptureDevice>> {
        self.devices
            .iter()
            .map(|device| Arc::clone(device) as Arc<dyn CaptureDevice>)
            .collect()
    }

    fn new_session(&self) -> Box<dyn CaptureSession> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SessionHandle {
            output: Mutex::new(None),
            events: tx,
            running: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        });
        self.sessions.lock().unwrap().push(Arc::clone(&handle));
        Box::new(MockSession {
            handle,
            controls: Arc::clone(&self.controls),
            input: None,
            events: Some(rx),
            in_configuration: false,
        })
    }
}

/// Observer that records every notification.
#[derive(Default)]
pub struct RecordingObserver {
    pub states: Mutex<Vec<SessionState>>,
    pub rates: Mutex<Vec<u32>>,
    pub errors: Mutex<Vec<CaptureError>>,
    pub previews: Mutex<Vec<PreviewSurface>>,
    pub orientations: Mutex<Vec<VideoOrientation>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn rates(&self) -> Vec<u32> {
        self.rates.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, state: &SessionState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn on_rate_update(&self, fps: u32) {
        self.rates.lock().unwrap().push(fps);
    }

    fn on_runtime_error(&self, error: &CaptureError) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn on_preview_attached(&self, surface: PreviewSurface) {
        self.previews.lock().unwrap().push(surface);
    }

    fn on_orientation_changed(&self, orientation: VideoOrientation) {
        self.orientations.lock().unwrap().push(orientation);
    }
}

/// Consumer that keeps the sequence number of every frame it sees.
#[derive(Default)]
pub struct FrameLog {
    pub sequences: Mutex<Vec<u64>>,
}

impl FrameLog {
    pub fn count(&self) -> usize {
        self.sequences.lock().unwrap().len()
    }
}

impl vox_capture::FrameConsumer for FrameLog {
    fn on_frame(&self, frame: &Frame) {
        self.sequences.lock().unwrap().push(frame.sequence);
    }
}

/// Wait until the published state satisfies `pred`.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<SessionState>,
    pred: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("state channel closed")
        .clone()
}

/// Poll `cond` until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
