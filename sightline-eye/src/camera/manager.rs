//! Camera stream lifecycle and mirroring state

use crate::camera::{
    CameraPlatform, DeviceDescriptor, DeviceKind, FacingMode, MediaStream, StreamConstraints, VideoFrame,
};
use crate::config::FlipPolicy;
use crate::error::AcquisitionError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Horizontal mirroring of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlipState {
    flipped: bool,
    user_override: bool,
}

impl FlipState {
    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    /// True once the user has toggled flip explicitly.
    pub fn is_user_override(&self) -> bool {
        self.user_override
    }
}

/// The active camera capture.
pub struct StreamSession {
    id: u64,
    device_id: Option<String>,
    facing_mode: FacingMode,
    stream: Box<dyn MediaStream>,
}

impl StreamSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn video_dimensions(&self) -> Option<(u32, u32)> {
        self.stream.video_dimensions()
    }

    pub fn current_time(&self) -> f64 {
        self.stream.current_time()
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.stream.current_frame()
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_live()
    }
}

/// Device manager owning the single live camera session
pub struct DeviceManager {
    platform: Arc<dyn CameraPlatform>,
    resolution: (u32, u32),
    flip_policy: FlipPolicy,
    granted: AtomicBool,
    session: RwLock<Option<Arc<StreamSession>>>,
    flip: RwLock<FlipState>,
    // Serializes stop-then-acquire so two switches never overlap.
    switch_lock: AsyncMutex<()>,
    next_session_id: AtomicU64,
}

impl DeviceManager {
    /// Create a new device manager
    pub fn new(platform: Arc<dyn CameraPlatform>, resolution: (u32, u32), flip_policy: FlipPolicy) -> Self {
        Self {
            platform,
            resolution,
            flip_policy,
            granted: AtomicBool::new(false),
            session: RwLock::new(None),
            flip: RwLock::new(FlipState::default()),
            switch_lock: AsyncMutex::new(()),
            next_session_id: AtomicU64::new(0),
        }
    }

    /// Constraints for acquiring `device_id`, or any camera when `None`.
    pub fn constraints(&self, device_id: Option<&str>) -> StreamConstraints {
        StreamConstraints {
            width: self.resolution.0,
            height: self.resolution.1,
            device_id: device_id.map(str::to_string),
        }
    }

    pub fn platform(&self) -> &Arc<dyn CameraPlatform> {
        &self.platform
    }

    pub fn is_permission_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    /// Enumerate video inputs. Labels and facing modes are only meaningful
    /// after permission was granted, so this refuses before then.
    pub async fn list_cameras(&self) -> Result<Vec<DeviceDescriptor>, AcquisitionError> {
        if !self.is_permission_granted() {
            return Err(AcquisitionError::PermissionDenied);
        }

        let devices = self.platform.enumerate_devices().await.map_err(|e| self.note_failure(e))?;
        let cameras: Vec<DeviceDescriptor> = devices
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .map(DeviceDescriptor::from)
            .collect();
        debug!("Enumerated {} cameras", cameras.len());
        Ok(cameras)
    }

    /// Take ownership of a stream acquired by the permission flow.
    pub async fn adopt(&self, stream: Box<dyn MediaStream>) -> Arc<StreamSession> {
        let _switching = self.switch_lock.lock().await;
        self.granted.store(true, Ordering::SeqCst);
        self.stop_current().await;
        let facing = stream.facing_mode();
        self.publish(stream, facing)
    }

    /// Stop the current session, then acquire `device_id` (or any camera).
    ///
    /// The old tracks are fully stopped before the new acquisition starts;
    /// some platforms refuse a second camera while the first is still open.
    pub async fn switch_to(&self, device_id: Option<&str>) -> Result<Arc<StreamSession>, AcquisitionError> {
        if !self.is_permission_granted() {
            return Err(AcquisitionError::PermissionDenied);
        }

        let _switching = self.switch_lock.lock().await;
        self.stop_current().await;

        let constraints = self.constraints(device_id);
        info!("Acquiring camera {:?} at {}x{}", device_id, constraints.width, constraints.height);
        let stream = self
            .platform
            .acquire(&constraints)
            .await
            .map_err(|e| self.note_failure(e))?;

        let mut facing = stream.facing_mode();
        if facing == FacingMode::Unknown {
            if let Some(id) = stream.device_id().or_else(|| device_id.map(str::to_string)) {
                facing = self.descriptor_facing(&id).await;
            }
        }

        Ok(self.publish(stream, facing))
    }

    /// Currently live session, if any.
    pub fn current(&self) -> Option<Arc<StreamSession>> {
        self.session.read().clone()
    }

    pub fn flip_state(&self) -> FlipState {
        *self.flip.read()
    }

    pub fn is_flipped(&self) -> bool {
        self.flip.read().flipped
    }

    /// Explicit user toggle. No stream or detector side effects.
    pub fn toggle_flip(&self) -> bool {
        let mut flip = self.flip.write();
        flip.flipped = !flip.flipped;
        flip.user_override = true;
        debug!("Flip toggled to {}", flip.flipped);
        flip.flipped
    }

    /// Stop and forget the current session.
    pub async fn release(&self) {
        let _switching = self.switch_lock.lock().await;
        self.stop_current().await;
    }

    async fn stop_current(&self) {
        let previous = self.session.write().take();
        if let Some(previous) = previous {
            previous.stream.stop().await;
            if previous.is_live() {
                warn!("Camera session {} still reports live tracks after stop", previous.id());
            }
            info!("Stopped camera session {}", previous.id());
        }
    }

    fn publish(&self, stream: Box<dyn MediaStream>, facing: FacingMode) -> Arc<StreamSession> {
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(StreamSession {
            id,
            device_id: stream.device_id(),
            facing_mode: facing,
            stream,
        });
        *self.session.write() = Some(session.clone());
        self.apply_facing(facing);
        info!(
            "Camera session {} live on {:?} (facing {:?}, flipped {})",
            id,
            session.device_id(),
            facing,
            self.is_flipped()
        );
        session
    }

    fn apply_facing(&self, facing: FacingMode) {
        let mut flip = self.flip.write();
        match self.flip_policy {
            FlipPolicy::FollowDevice => {
                flip.flipped = facing.default_flip();
                flip.user_override = false;
            }
            FlipPolicy::PreserveUserChoice => {
                if !flip.user_override {
                    flip.flipped = facing.default_flip();
                }
            }
        }
    }

    async fn descriptor_facing(&self, device_id: &str) -> FacingMode {
        match self.platform.enumerate_devices().await {
            Ok(devices) => devices
                .into_iter()
                .find(|d| d.kind == DeviceKind::VideoInput && d.device_id == device_id)
                .map(|d| d.facing_mode)
                .unwrap_or_default(),
            Err(e) => {
                debug!("Could not enumerate devices for facing mode: {}", e);
                FacingMode::Unknown
            }
        }
    }

    fn note_failure(&self, err: AcquisitionError) -> AcquisitionError {
        if err == AcquisitionError::PermissionDenied {
            self.granted.store(false, Ordering::SeqCst);
        }
        warn!("Camera operation failed: {}", err);
        err
    }
}
