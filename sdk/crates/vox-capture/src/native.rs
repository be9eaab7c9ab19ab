//! Camera backend on top of nokhwa.
//!
//! nokhwa has no device lock or deferred commit, so [`NativeDevice`] keeps
//! staged and committed configuration itself and applies the committed format
//! when the stream is opened. Each running session owns one capture thread
//! that constructs the camera, reads frames and pushes them into the session's
//! [`FrameOutput`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::DeviceError;
use crate::format::{CaptureFormat, FrameRateRange};
use crate::output::FrameOutput;
use crate::platform::{
    CaptureDevice, CapturePlatform, CaptureSession, DeviceChange, DevicePosition, SessionEvent,
};
use crate::state::RuntimeErrorCause;

fn backend_error(err: nokhwa::NokhwaError) -> DeviceError {
    DeviceError::Backend(err.to_string())
}

/// A format as advertised to the controller, paired with the nokhwa pixel
/// format needed to request it again.
#[derive(Debug, Clone)]
struct NativeFormat {
    format: CaptureFormat,
    frame_format: FrameFormat,
}

#[derive(Debug, Clone, Default)]
struct DeviceSettings {
    format: Option<CaptureFormat>,
    fps: Option<u32>,
}

#[derive(Debug, Default)]
struct DeviceConfig {
    locked: bool,
    staged: DeviceSettings,
    committed: DeviceSettings,
}

/// A camera found by nokhwa.
pub struct NativeDevice {
    index: CameraIndex,
    unique_id: String,
    name: String,
    position: DevicePosition,
    formats: OnceLock<Vec<NativeFormat>>,
    config: Mutex<DeviceConfig>,
}

impl NativeDevice {
    fn new(index: CameraIndex, name: String, position: DevicePosition) -> Self {
        Self {
            unique_id: format!("nokhwa:{}", index),
            index,
            name,
            position,
            formats: OnceLock::new(),
            config: Mutex::new(DeviceConfig::default()),
        }
    }

    fn native_formats(&self) -> &[NativeFormat] {
        self.formats.get_or_init(|| match self.probe_formats() {
            Ok(formats) => formats,
            Err(err) => {
                warn!("Could not enumerate formats for {}: {}", self.name, err);
                Vec::new()
            }
        })
    }

    /// Open the camera briefly and group its modes by size and pixel format.
    fn probe_formats(&self) -> Result<Vec<NativeFormat>, DeviceError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(self.index.clone(), requested).map_err(backend_error)?;
        let modes = camera.compatible_camera_formats().map_err(backend_error)?;

        let mut formats: Vec<NativeFormat> = Vec::new();
        for mode in modes {
            let (width, height) = (mode.width(), mode.height());
            let range = FrameRateRange::fixed(f64::from(mode.frame_rate()));
            match formats.iter_mut().find(|f| {
                f.frame_format == mode.format() && f.format.has_dimensions(width, height)
            }) {
                Some(existing) => existing.format.frame_rate_ranges.push(range),
                None => formats.push(NativeFormat {
                    format: CaptureFormat::new(width, height, vec![range])
                        .with_pixel_format(format!("{:?}", mode.format())),
                    frame_format: mode.format(),
                }),
            }
        }
        debug!("{} advertises {} formats", self.name, formats.len());
        Ok(formats)
    }

    /// The committed format as a nokhwa stream request.
    fn stream_format(&self) -> Result<CameraFormat, DeviceError> {
        let committed = self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .committed
            .clone();
        let format = committed
            .format
            .ok_or_else(|| DeviceError::Unsupported("no active format committed".into()))?;
        let native = self
            .native_formats()
            .iter()
            .find(|f| f.format == format)
            .ok_or_else(|| DeviceError::Unsupported(format!("{} is not advertised", format)))?;
        let fps = committed
            .fps
            .or_else(|| format.max_frame_rate().map(|max| max.round() as u32))
            .unwrap_or(30);
        Ok(CameraFormat::new(
            Resolution::new(format.width, format.height),
            native.frame_format,
            fps,
        ))
    }
}

impl CaptureDevice for NativeDevice {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn formats(&self) -> Vec<CaptureFormat> {
        self.native_formats()
            .iter()
            .map(|f| f.format.clone())
            .collect()
    }

    fn active_format(&self) -> Option<CaptureFormat> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .committed
            .format
            .clone()
    }

    fn lock_for_configuration(&self) -> Result<(), DeviceError> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if config.locked {
            return Err(DeviceError::Locked(format!(
                "{} is already being configured",
                self.name
            )));
        }
        config.locked = true;
        config.staged = config.committed.clone();
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if config.locked {
            config.committed = config.staged.clone();
            config.locked = false;
        }
    }

    fn apply(&self, change: DeviceChange) -> Result<(), DeviceError> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if !config.locked {
            return Err(DeviceError::Backend(format!(
                "{} is not locked for configuration",
                self.name
            )));
        }
        match change {
            DeviceChange::SmoothAutoFocus(_) => {
                return Err(DeviceError::Unsupported("smooth auto-focus".into()));
            }
            DeviceChange::ActiveFormat(format) => config.staged.format = Some(format),
            DeviceChange::FrameDuration { min, .. } => {
                if min.is_zero() {
                    return Err(DeviceError::Unsupported("zero frame duration".into()));
                }
                let fps = (1.0 / min.as_secs_f64()).round() as u32;
                config.staged.fps = Some(fps.max(1));
            }
        }
        Ok(())
    }
}

/// Platform backed by the cameras nokhwa can enumerate.
///
/// The first camera is reported as the front camera; the rest are external.
pub struct NativePlatform {
    devices: Arc<HashMap<String, Arc<NativeDevice>>>,
    order: Vec<String>,
}

impl NativePlatform {
    pub fn discover() -> Result<Self, DeviceError> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(backend_error)?;
        let mut devices = HashMap::new();
        let mut order = Vec::new();
        for (i, info) in cameras.into_iter().enumerate() {
            let position = if i == 0 {
                DevicePosition::Front
            } else {
                DevicePosition::External
            };
            let device = NativeDevice::new(info.index().clone(), info.human_name(), position);
            info!("Found {} camera {} ({})", position, device.name, device.unique_id);
            order.push(device.unique_id.clone());
            devices.insert(device.unique_id.clone(), Arc::new(device));
        }
        Ok(Self {
            devices: Arc::new(devices),
            order,
        })
    }
}

impl CapturePlatform for NativePlatform {
    fn default_device(&self, position: DevicePosition) -> Option<Arc<dyn CaptureDevice>> {
        self.order
            .iter()
            .filter_map(|id| self.devices.get(id))
            .find(|device| device.position == position)
            .map(|device| Arc::clone(device) as Arc<dyn CaptureDevice>)
    }

    fn devices(&self) -> Vec<Arc<dyn CaptureDevice>> {
        self.order
            .iter()
            .filter_map(|id| self.devices.get(id))
            .map(|device| Arc::clone(device) as Arc<dyn CaptureDevice>)
            .collect()
    }

    fn new_session(&self) -> Box<dyn CaptureSession> {
        Box::new(NativeSession::new(Arc::clone(&self.devices)))
    }
}

struct CaptureThread {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A session driving one nokhwa camera stream.
pub struct NativeSession {
    registry: Arc<HashMap<String, Arc<NativeDevice>>>,
    input: Option<Arc<NativeDevice>>,
    output: Option<FrameOutput>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    thread: Option<CaptureThread>,
}

impl NativeSession {
    fn new(registry: Arc<HashMap<String, Arc<NativeDevice>>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            input: None,
            output: None,
            events_tx,
            events_rx: Some(events_rx),
            thread: None,
        }
    }

    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.stop.store(true, Ordering::Release);
            if thread.handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

impl CaptureSession for NativeSession {
    fn begin_configuration(&mut self) {}

    fn commit_configuration(&mut self) {}

    fn can_add_input(&self, device: &dyn CaptureDevice) -> bool {
        self.input.is_none() && self.registry.contains_key(device.unique_id())
    }

    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<(), DeviceError> {
        let native = self
            .registry
            .get(device.unique_id())
            .ok_or_else(|| DeviceError::Unsupported(format!("unknown device {}", device.name())))?;
        self.input = Some(Arc::clone(native));
        Ok(())
    }

    fn can_add_output(&self, _output: &FrameOutput) -> bool {
        self.output.is_none()
    }

    fn add_output(&mut self, output: FrameOutput) -> Result<(), DeviceError> {
        self.output = Some(output);
        Ok(())
    }

    fn remove_all(&mut self) {
        self.join_thread();
        self.input = None;
        self.output = None;
    }

    fn start_running(&mut self) -> Result<(), DeviceError> {
        if self.is_running() {
            return Ok(());
        }
        self.join_thread();

        let device = self
            .input
            .clone()
            .ok_or_else(|| DeviceError::Backend("session has no input".into()))?;
        let output = self
            .output
            .clone()
            .ok_or_else(|| DeviceError::Backend("session has no output".into()))?;
        let format = device.stream_format()?;

        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let described = format!("{:?}", format);
        let stream = StreamThread {
            index: device.index.clone(),
            format,
            output,
            events: self.events_tx.clone(),
            stop: Arc::clone(&stop),
            running: Arc::clone(&running),
        };
        let handle = std::thread::Builder::new()
            .name("vox-capture".into())
            .spawn(move || stream.run(ready_tx))
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| {
                Err(DeviceError::Backend(
                    "capture thread exited before opening the camera".into(),
                ))
            });
        self.thread = Some(CaptureThread {
            stop,
            running,
            handle,
        });
        if let Err(err) = ready {
            self.join_thread();
            return Err(err);
        }
        info!("Streaming {} as {}", device.name, described);
        Ok(())
    }

    fn stop_running(&mut self) {
        self.join_thread();
    }

    fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| thread.running.load(Ordering::Acquire))
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        self.join_thread();
    }
}

/// State moved onto the capture thread.
struct StreamThread {
    index: CameraIndex,
    format: CameraFormat,
    output: FrameOutput,
    events: mpsc::UnboundedSender<SessionEvent>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl StreamThread {
    fn run(self, ready: std_mpsc::Sender<Result<(), DeviceError>>) {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(self.format));
        let opened = Camera::new(self.index.clone(), requested).and_then(|mut camera| {
            camera.open_stream()?;
            Ok(camera)
        });
        let mut camera = match opened {
            Ok(camera) => camera,
            Err(err) => {
                self.running.store(false, Ordering::Release);
                let _ = ready.send(Err(backend_error(err)));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        while !self.stop.load(Ordering::Acquire) {
            match camera.frame() {
                Ok(buffer) => {
                    let resolution = buffer.resolution();
                    self.output.deliver(
                        Bytes::copy_from_slice(buffer.buffer()),
                        resolution.width(),
                        resolution.height(),
                    );
                }
                Err(err) => {
                    error!("Camera {} stopped delivering frames: {}", self.index, err);
                    let _ = self.events.send(SessionEvent::RuntimeError(
                        RuntimeErrorCause::Other(err.to_string()),
                    ));
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        if let Err(err) = camera.stop_stream() {
            warn!("Failed to close camera {}: {}", self.index, err);
        }
        debug!("Capture thread for {} finished", self.index);
    }
}
