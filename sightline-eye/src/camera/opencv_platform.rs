//! Native camera platform backed by OpenCV `VideoCapture`
//!
//! OpenCV has no device labels or facing metadata, so cameras are probed by
//! index and reported with `FacingMode::Unknown`.

use crate::camera::{
    CameraPlatform, DeviceKind, FacingMode, MediaDeviceInfo, MediaStream, StreamConstraints, VideoFrame,
};
use crate::error::AcquisitionError;
use async_trait::async_trait;
use bytes::Bytes;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_MAX_PROBE: i32 = 4;

/// Camera platform probing `VideoCapture` indices.
pub struct OpenCvPlatform {
    max_probe: i32,
}

impl OpenCvPlatform {
    pub fn new() -> Self {
        Self {
            max_probe: DEFAULT_MAX_PROBE,
        }
    }

    /// Probe indices `0..max_probe` during enumeration.
    pub fn with_max_probe(max_probe: i32) -> Self {
        Self {
            max_probe: max_probe.max(1),
        }
    }
}

impl Default for OpenCvPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn open_capture(index: i32) -> Result<VideoCapture, AcquisitionError> {
    let capture = VideoCapture::new(index, CAP_ANY)
        .map_err(|e| AcquisitionError::Platform(format!("failed to open camera {}: {}", index, e.message)))?;
    let opened = capture
        .is_opened()
        .map_err(|e| AcquisitionError::Platform(format!("camera {} not opened: {}", index, e.message)))?;
    if !opened {
        return Err(AcquisitionError::DeviceNotFound(index.to_string()));
    }
    Ok(capture)
}

#[async_trait]
impl CameraPlatform for OpenCvPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, AcquisitionError> {
        let max_probe = self.max_probe;
        tokio::task::spawn_blocking(move || {
            let mut devices = Vec::new();
            for index in 0..max_probe {
                if let Ok(mut capture) = open_capture(index) {
                    let _ = capture.release();
                    devices.push(MediaDeviceInfo {
                        device_id: index.to_string(),
                        label: format!("Camera {}", index),
                        kind: DeviceKind::VideoInput,
                        facing_mode: FacingMode::Unknown,
                    });
                }
            }
            debug!("Probed {} OpenCV cameras", devices.len());
            devices
        })
        .await
        .map_err(|e| AcquisitionError::Platform(format!("camera probe task failed: {}", e)))
    }

    async fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, AcquisitionError> {
        let index = match constraints.device_id.as_deref() {
            Some(id) => id
                .parse::<i32>()
                .map_err(|_| AcquisitionError::DeviceNotFound(id.to_string()))?,
            None => 0,
        };
        let (width, height) = (constraints.width as f64, constraints.height as f64);

        let capture = tokio::task::spawn_blocking(move || {
            let mut capture = open_capture(index)?;
            let resized = capture
                .set(CAP_PROP_FRAME_WIDTH, width)
                .and_then(|_| capture.set(CAP_PROP_FRAME_HEIGHT, height));
            if let Err(e) = resized {
                warn!("Camera {} ignored resolution hint: {}", index, e.message);
            }
            Ok::<_, AcquisitionError>(capture)
        })
        .await
        .map_err(|e| AcquisitionError::Platform(format!("camera open task failed: {}", e)))??;

        info!("Opened OpenCV camera {}", index);
        Ok(Box::new(OpenCvStream {
            index,
            capture: Mutex::new(Some(capture)),
            dimensions: Mutex::new(None),
            opened_at: Instant::now(),
        }))
    }
}

struct OpenCvStream {
    index: i32,
    capture: Mutex<Option<VideoCapture>>,
    dimensions: Mutex<Option<(u32, u32)>>,
    opened_at: Instant,
}

#[async_trait]
impl MediaStream for OpenCvStream {
    fn device_id(&self) -> Option<String> {
        Some(self.index.to_string())
    }

    fn facing_mode(&self) -> FacingMode {
        FacingMode::Unknown
    }

    fn video_dimensions(&self) -> Option<(u32, u32)> {
        *self.dimensions.lock()
    }

    fn current_time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        let mut guard = self.capture.lock();
        let capture = guard.as_mut()?;

        let mut mat = Mat::default();
        match capture.read(&mut mat) {
            Ok(true) if mat.rows() > 0 && mat.cols() > 0 => {}
            Ok(_) => return None,
            Err(e) => {
                warn!("Camera {} read error: {}", self.index, e.message);
                return None;
            }
        }

        let (width, height) = (mat.cols() as u32, mat.rows() as u32);
        let data = match mat.data_bytes() {
            Ok(bytes) => Bytes::copy_from_slice(bytes),
            Err(e) => {
                warn!("Camera {} frame not contiguous: {}", self.index, e.message);
                return None;
            }
        };
        *self.dimensions.lock() = Some((width, height));

        Some(VideoFrame {
            width,
            height,
            media_time: self.current_time(),
            data,
        })
    }

    async fn stop(&self) {
        let capture = self.capture.lock().take();
        if let Some(mut capture) = capture {
            if let Err(e) = capture.release() {
                warn!("Camera {} release error: {}", self.index, e.message);
            }
            info!("Released OpenCV camera {}", self.index);
        }
    }

    fn is_live(&self) -> bool {
        self.capture.lock().is_some()
    }
}
