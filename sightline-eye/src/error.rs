//! Error types for sightline-eye

use thiserror::Error;

/// Failure fetching a model payload over the network.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch model {path}: HTTP {status}{suffix}", suffix = reason_suffix(.reason))]
    Status {
        path: String,
        status: u16,
        reason: Option<&'static str>,
    },

    #[error("Network error fetching model {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Stream error fetching model {path}: {message}")]
    Stream { path: String, message: String },

    #[error("Model {path} too large: {size} bytes (max {max} bytes)")]
    TooLarge { path: String, size: u64, max: u64 },

    #[error("Invalid model path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl FetchError {
    /// The model path the failed request was for.
    pub fn path(&self) -> &str {
        match self {
            FetchError::Status { path, .. }
            | FetchError::Network { path, .. }
            | FetchError::Stream { path, .. }
            | FetchError::TooLarge { path, .. }
            | FetchError::InvalidPath { path, .. } => path,
        }
    }
}

fn reason_suffix(reason: &Option<&'static str>) -> String {
    reason.map(|r| format!(" {}", r)).unwrap_or_default()
}

/// The detection engine refused to build an instance from a model payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to build detector for model {model}: {reason}")]
pub struct DetectorBuildError {
    pub model: String,
    pub reason: String,
}

/// Camera acquisition and enumeration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera not found: {0}")]
    DeviceNotFound(String),

    #[error("Camera in use: {0}")]
    DeviceInUse(String),

    #[error("Camera cannot satisfy constraints: {0}")]
    Overconstrained(String),

    #[error("Camera permission request already in progress")]
    RequestPending,

    #[error("Camera error: {0}")]
    Platform(String),
}

impl AcquisitionError {
    /// Message shown to the user for this failure kind.
    pub fn user_message(&self) -> String {
        match self {
            AcquisitionError::PermissionDenied => {
                "Camera access was denied. Allow camera access for this app and retry.".to_string()
            }
            AcquisitionError::DeviceNotFound(_) => {
                "No camera was found. Connect a camera and retry.".to_string()
            }
            AcquisitionError::DeviceInUse(_) => {
                "The camera is already in use by another application. Close it and retry.".to_string()
            }
            AcquisitionError::Overconstrained(_) => {
                "The selected camera does not support the requested resolution.".to_string()
            }
            AcquisitionError::RequestPending => {
                "Waiting for the camera permission prompt to be answered.".to_string()
            }
            AcquisitionError::Platform(detail) => format!("The camera could not be started: {}", detail),
        }
    }
}

/// Top-level error surfaced to the UI layer.
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    DetectorBuild(#[from] DetectorBuildError),

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera acquisition failed: {0}")]
    DeviceAcquisition(AcquisitionError),

    #[error("Detection runtime failed to load: {0}")]
    CriticalDependencyLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid control value: {0}")]
    InvalidControl(String),

    #[error("Viewer not ready: {0}")]
    NotReady(String),
}

impl From<AcquisitionError> for ViewerError {
    fn from(err: AcquisitionError) -> Self {
        match err {
            AcquisitionError::PermissionDenied => ViewerError::PermissionDenied,
            other => ViewerError::DeviceAcquisition(other),
        }
    }
}

impl ViewerError {
    /// True for failures that only affect one rebuild and leave a running viewer intact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ViewerError::Fetch(_)
                | ViewerError::DetectorBuild(_)
                | ViewerError::InvalidControl(_)
                | ViewerError::DeviceAcquisition(_)
        )
    }
}
