//! Capture configuration.

use crate::error::{CaptureError, Result};
use crate::format::DesiredCaptureSpec;
use crate::platform::DevicePosition;

/// Configuration for a capture controller
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requested resolution and frame rate
    pub desired: DesiredCaptureSpec,
    /// Device positions to try, in order
    pub device_preference: Vec<DevicePosition>,
    /// Turn off smooth auto-focus on devices that support it
    pub disable_smooth_autofocus: bool,
    /// Frames per second below target tolerated before warning
    pub rate_tolerance: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            desired: DesiredCaptureSpec::new(1280, 720, 60),
            device_preference: vec![DevicePosition::Back, DevicePosition::Front],
            disable_smooth_autofocus: true,
            rate_tolerance: 2,
        }
    }
}

impl CaptureConfig {
    /// 1280x720 at `fps`
    pub fn hd_720p(fps: u32) -> Self {
        Self {
            desired: DesiredCaptureSpec::new(1280, 720, fps),
            ..Default::default()
        }
    }

    /// 1920x1080 at `fps`
    pub fn fhd_1080p(fps: u32) -> Self {
        Self {
            desired: DesiredCaptureSpec::new(1920, 1080, fps),
            ..Default::default()
        }
    }

    /// 3840x2160 at `fps`
    pub fn uhd_4k(fps: u32) -> Self {
        Self {
            desired: DesiredCaptureSpec::new(3840, 2160, fps),
            ..Default::default()
        }
    }

    pub fn with_device_preference(mut self, preference: Vec<DevicePosition>) -> Self {
        self.device_preference = preference;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let desired = &self.desired;
        if desired.width == 0 || desired.height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "capture size must be non-zero, got {}x{}",
                desired.width, desired.height
            )));
        }
        if desired.target_fps == 0 {
            return Err(CaptureError::InvalidConfig(
                "target frame rate must be at least 1".into(),
            ));
        }
        if self.device_preference.is_empty() {
            return Err(CaptureError::InvalidConfig(
                "device preference list is empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.desired, DesiredCaptureSpec::new(1280, 720, 60));
        assert_eq!(
            config.device_preference,
            vec![DevicePosition::Back, DevicePosition::Front]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(CaptureConfig::fhd_1080p(30).desired.width, 1920);
        assert_eq!(CaptureConfig::uhd_4k(60).desired.height, 2160);
        assert_eq!(CaptureConfig::hd_720p(120).desired.target_fps, 120);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = CaptureConfig::hd_720p(0);
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));

        config.desired = DesiredCaptureSpec::new(0, 720, 30);
        assert!(config.validate().is_err());

        let config = CaptureConfig::default().with_device_preference(Vec::new());
        assert!(config.validate().is_err());
    }
}
