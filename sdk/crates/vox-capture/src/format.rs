//! Capture format negotiation.
//!
//! Devices advertise a list of formats, each a pixel size plus the frame-rate
//! ranges the sensor can sustain at that size. [`select_format`] picks the one
//! that exactly matches the requested size and reaches the requested rate.

use std::fmt;
use std::time::Duration;

/// Supported frame-rate interval of one capture format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateRange {
    pub min_fps: f64,
    pub max_fps: f64,
}

impl FrameRateRange {
    pub fn new(min_fps: f64, max_fps: f64) -> Self {
        Self { min_fps, max_fps }
    }

    /// A range containing a single rate.
    pub fn fixed(fps: f64) -> Self {
        Self::new(fps, fps)
    }
}

/// A hardware-advertised combination of pixel size and frame-rate ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate_ranges: Vec<FrameRateRange>,
    /// Backend pixel layout (e.g. "MJPEG", "NV12"), if known.
    pub pixel_format: Option<String>,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, frame_rate_ranges: Vec<FrameRateRange>) -> Self {
        Self {
            width,
            height,
            frame_rate_ranges,
            pixel_format: None,
        }
    }

    pub fn with_pixel_format(mut self, pixel_format: impl Into<String>) -> Self {
        self.pixel_format = Some(pixel_format.into());
        self
    }

    /// Highest `max_fps` across all ranges, `None` when no range is advertised.
    pub fn max_frame_rate(&self) -> Option<f64> {
        self.frame_rate_ranges
            .iter()
            .map(|range| range.max_fps)
            .filter(|fps| !fps.is_nan())
            .fold(None, |best, fps| match best {
                Some(b) if b >= fps => Some(b),
                _ => Some(fps),
            })
    }

    pub fn has_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)?;
        if let Some(max) = self.max_frame_rate() {
            write!(f, " @ {:.0}fps", max)?;
        }
        if let Some(ref pixel_format) = self.pixel_format {
            write!(f, " ({})", pixel_format)?;
        }
        Ok(())
    }
}

/// Requested capture characteristics, fixed for the life of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredCaptureSpec {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl DesiredCaptureSpec {
    pub fn new(width: u32, height: u32, target_fps: u32) -> Self {
        Self {
            width,
            height,
            target_fps,
        }
    }

    /// Frame interval pinned as both the minimum and maximum frame duration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

impl fmt::Display for DesiredCaptureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.target_fps)
    }
}

/// Pick the best format for `desired` out of `available`.
///
/// Candidates must match the requested size exactly and reach at least the
/// target rate. The candidate with the highest maximum rate wins; ties go to
/// the earliest entry in `available`. Returns `None` when nothing qualifies,
/// which callers must treat as a configuration failure.
pub fn select_format<'a>(
    available: &'a [CaptureFormat],
    desired: &DesiredCaptureSpec,
) -> Option<&'a CaptureFormat> {
    let target = f64::from(desired.target_fps);
    let mut best: Option<(&CaptureFormat, f64)> = None;

    for format in available {
        if !format.has_dimensions(desired.width, desired.height) {
            continue;
        }
        let Some(max_fps) = format.max_frame_rate() else {
            continue;
        };
        if max_fps < target {
            continue;
        }
        match best {
            Some((_, best_fps)) if best_fps >= max_fps => {}
            _ => best = Some((format, max_fps)),
        }
    }

    best.map(|(format, _)| format)
}
