//! Camera platform seam, device lifecycle and permission gating

pub mod manager;
#[cfg(feature = "opencv-camera")]
pub mod opencv_platform;
pub mod permission;

pub use manager::{DeviceManager, FlipState, StreamSession};
#[cfg(feature = "opencv-camera")]
pub use opencv_platform::OpenCvPlatform;
pub use permission::{PermissionFlow, PermissionState};

use crate::error::AcquisitionError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which way a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
    #[default]
    Unknown,
}

impl FacingMode {
    /// Parse platform facing-mode metadata; anything unrecognised is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => FacingMode::User,
            "environment" => FacingMode::Environment,
            _ => FacingMode::Unknown,
        }
    }

    /// Mirror user-facing cameras so the preview reads like a mirror.
    pub fn default_flip(self) -> bool {
        matches!(self, FacingMode::User)
    }
}

/// Kind of media device reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Raw enumeration entry from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
    pub facing_mode: FacingMode,
}

/// A selectable camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub label: String,
    pub facing_mode: FacingMode,
}

impl From<MediaDeviceInfo> for DeviceDescriptor {
    fn from(info: MediaDeviceInfo) -> Self {
        Self {
            device_id: info.device_id,
            label: info.label,
            facing_mode: info.facing_mode,
        }
    }
}

/// Acquisition request: a resolution hint and an optional exact device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub device_id: Option<String>,
}

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Media timeline position in seconds
    pub media_time: f64,
    pub data: Bytes,
}

/// Camera platform API: enumeration and stream acquisition.
#[async_trait]
pub trait CameraPlatform: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, AcquisitionError>;

    async fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, AcquisitionError>;
}

/// A live capture stream and the video element presenting it.
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// Device the video track is bound to, from track settings.
    fn device_id(&self) -> Option<String>;

    /// Facing mode from track settings.
    fn facing_mode(&self) -> FacingMode;

    /// Native frame dimensions once known.
    fn video_dimensions(&self) -> Option<(u32, u32)>;

    /// Current media timeline position in seconds.
    fn current_time(&self) -> f64;

    /// Current frame, or `None` while buffering.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop every track. Returns once the device is released.
    async fn stop(&self);

    /// True while any track is still running.
    fn is_live(&self) -> bool;
}
