use pyo3::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::native::NativePlatform;
use crate::output::Frame;
use crate::presenter::{PreviewSurface, SessionObserver, VideoOrientation};
use crate::session::CaptureController;
use crate::state::SessionState;

/// Commands from Python to the capture runtime.
enum ClientCommand {
    Configure,
    Resume,
    Stop,
    AttachPreview(PreviewSurface),
    SetOrientation(VideoOrientation),
}

#[derive(Default)]
struct ClientSnapshot {
    state: SessionState,
    fps: u32,
    last_error: Option<String>,
}

type SharedSnapshot = Arc<Mutex<ClientSnapshot>>;

fn update(snapshot: &SharedSnapshot, f: impl FnOnce(&mut ClientSnapshot)) {
    f(&mut snapshot.lock().unwrap_or_else(PoisonError::into_inner));
}

/// Mirrors session notifications into state readable from Python.
struct SnapshotObserver {
    snapshot: SharedSnapshot,
}

impl SessionObserver for SnapshotObserver {
    fn on_state_change(&self, state: &SessionState) {
        update(&self.snapshot, |s| {
            s.state = state.clone();
            if !state.is_active() {
                s.fps = 0;
            }
        });
    }

    fn on_rate_update(&self, fps: u32) {
        update(&self.snapshot, |s| s.fps = fps);
    }

    fn on_runtime_error(&self, error: &CaptureError) {
        update(&self.snapshot, |s| s.last_error = Some(error.to_string()));
    }
}

fn parse_orientation(name: &str) -> Option<VideoOrientation> {
    match name {
        "portrait" => Some(VideoOrientation::Portrait),
        "portrait_upside_down" => Some(VideoOrientation::PortraitUpsideDown),
        "landscape_left" => Some(VideoOrientation::LandscapeLeft),
        "landscape_right" => Some(VideoOrientation::LandscapeRight),
        _ => None,
    }
}

/// Camera capture session driven from Python.
///
/// Runs a background tokio runtime that owns the capture controller; method
/// calls are queued to it and results show up in the getters.
#[pyclass]
struct VoxCaptureClient {
    cmd_tx: Option<mpsc::UnboundedSender<ClientCommand>>,
    cancel: Option<CancellationToken>,
    rt_handle: Option<std::thread::JoinHandle<()>>,
    config: CaptureConfig,
    snapshot: SharedSnapshot,
    frames: Arc<AtomicU64>,
}

#[pymethods]
impl VoxCaptureClient {
    #[new]
    #[pyo3(signature = (width=1280, height=720, fps=60))]
    fn new(width: u32, height: u32, fps: u32) -> PyResult<Self> {
        let mut config = CaptureConfig::hd_720p(fps);
        config.desired.width = width;
        config.desired.height = height;
        config
            .validate()
            .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?;
        Ok(VoxCaptureClient {
            cmd_tx: None,
            cancel: None,
            rt_handle: None,
            config,
            snapshot: Arc::new(Mutex::new(ClientSnapshot::default())),
            frames: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start the background capture runtime.
    fn start(&mut self) -> PyResult<()> {
        if self.cancel.is_some() {
            return Err(PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(
                "Capture client is already running",
            ));
        }

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.cmd_tx = Some(cmd_tx);

        let config = self.config.clone();
        let snapshot = Arc::clone(&self.snapshot);
        let frames = Arc::clone(&self.frames);
        let handle = std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    update(&snapshot, |s| s.last_error = Some(e.to_string()));
                    return;
                }
            };
            rt.block_on(async move {
                let _ = tracing_subscriber::fmt().try_init();
                run_client_loop(cmd_rx, cancel, config, snapshot, frames).await;
            });
        });

        self.rt_handle = Some(handle);
        Ok(())
    }

    /// Acquire the camera and begin capturing.
    fn configure(&self) -> PyResult<()> {
        self.send_cmd(ClientCommand::Configure)
    }

    /// Restart a configured session, for example after a runtime error.
    fn resume(&self) -> PyResult<()> {
        self.send_cmd(ClientCommand::Resume)
    }

    /// Stop capturing and release the camera.
    fn stop(&self) -> PyResult<()> {
        self.send_cmd(ClientCommand::Stop)
    }

    fn attach_preview(&self, width: u32, height: u32) -> PyResult<()> {
        self.send_cmd(ClientCommand::AttachPreview(PreviewSurface { width, height }))
    }

    /// One of `portrait`, `portrait_upside_down`, `landscape_left`,
    /// `landscape_right`.
    fn set_orientation(&self, orientation: &str) -> PyResult<()> {
        let orientation = parse_orientation(orientation).ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Unknown orientation: {}",
                orientation
            ))
        })?;
        self.send_cmd(ClientCommand::SetOrientation(orientation))
    }

    /// Stop the capture runtime entirely.
    fn shutdown(&mut self) -> PyResult<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.cmd_tx = None;
        if let Some(handle) = self.rt_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    #[getter]
    fn state(&self) -> String {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .to_string()
    }

    /// Frames delivered in the last second.
    #[getter]
    fn fps(&self) -> u32 {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).fps
    }

    #[getter]
    fn frames_delivered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Most recent error, if any.
    #[getter]
    fn last_error(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error
            .clone()
    }
}

impl VoxCaptureClient {
    fn send_cmd(&self, cmd: ClientCommand) -> PyResult<()> {
        match &self.cmd_tx {
            Some(tx) => tx.send(cmd).map_err(|_| {
                PyErr::new::<pyo3::exceptions::PyRuntimeError, _>("Capture runtime is not running")
            }),
            None => Err(PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(
                "Capture client not started",
            )),
        }
    }
}

async fn run_client_loop(
    mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    cancel: CancellationToken,
    config: CaptureConfig,
    snapshot: SharedSnapshot,
    frames: Arc<AtomicU64>,
) {
    let platform = match NativePlatform::discover() {
        Ok(platform) => platform,
        Err(e) => {
            tracing::error!("Camera discovery failed: {}", e);
            update(&snapshot, |s| s.last_error = Some(e.to_string()));
            return;
        }
    };

    let consumer = move |_: &Frame| {
        frames.fetch_add(1, Ordering::Relaxed);
    };
    let controller = CaptureController::builder(Arc::new(platform))
        .config(config)
        .consumer(Arc::new(consumer))
        .observer(Arc::new(SnapshotObserver {
            snapshot: Arc::clone(&snapshot),
        }))
        .spawn();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let result = match cmd {
                    ClientCommand::Configure => controller.configure().await,
                    ClientCommand::Resume => controller.start().await,
                    ClientCommand::Stop => controller.stop().await,
                    ClientCommand::AttachPreview(surface) => {
                        controller.attach_preview(surface);
                        Ok(())
                    }
                    ClientCommand::SetOrientation(orientation) => {
                        controller.notify_orientation_changed(orientation);
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    tracing::warn!("Capture command failed: {}", e);
                    update(&snapshot, |s| s.last_error = Some(e.to_string()));
                }
            }
        }
    }

    if let Err(e) = controller.stop().await {
        tracing::debug!("Stop during shutdown: {}", e);
    }
    controller.shutdown();
}

/// Python module definition.
#[pymodule]
fn vox_capture(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<VoxCaptureClient>()?;
    Ok(())
}
