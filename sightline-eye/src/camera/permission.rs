//! Camera permission state machine
//!
//! `Unchecked -> Requesting -> {Granted, Denied}`. A denied request is only
//! retried when the user asks for it; there is no backoff or auto-retry.

use crate::camera::{CameraPlatform, MediaStream, StreamConstraints};
use crate::error::AcquisitionError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unchecked,
    Requesting,
    Granted,
    Denied,
}

pub struct PermissionFlow {
    state: RwLock<PermissionState>,
    attempts: AtomicU32,
}

impl PermissionFlow {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PermissionState::Unchecked),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> PermissionState {
        *self.state.read()
    }

    pub fn is_granted(&self) -> bool {
        self.state() == PermissionState::Granted
    }

    /// Number of acquisition calls made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Request camera access by acquiring a stream. Exactly one acquisition
    /// call per invocation; a second request while one is pending is refused.
    pub async fn request(
        &self,
        platform: &dyn CameraPlatform,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, AcquisitionError> {
        {
            let mut state = self.state.write();
            if *state == PermissionState::Requesting {
                return Err(AcquisitionError::RequestPending);
            }
            *state = PermissionState::Requesting;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Requesting camera permission (attempt {})", attempt);
        let result = platform.acquire(constraints).await;

        let next = match &result {
            Ok(_) => PermissionState::Granted,
            Err(AcquisitionError::PermissionDenied) => PermissionState::Denied,
            // Permission outcome is unknown when the device itself failed.
            Err(_) => PermissionState::Unchecked,
        };
        *self.state.write() = next;

        match &result {
            Ok(_) => info!("Camera permission granted"),
            Err(e) => warn!("Camera permission request ended in {:?}: {}", next, e),
        }
        result
    }

    /// Record a denial observed outside `request`, e.g. revoked mid-session.
    pub fn mark_denied(&self) {
        *self.state.write() = PermissionState::Denied;
    }
}

impl Default for PermissionFlow {
    fn default() -> Self {
        Self::new()
    }
}
