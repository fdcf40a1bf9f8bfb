//! sightline-eye: real-time camera object detection viewer
//!
//! Fetches and caches detection models, hot-swaps the active detector when
//! the user changes model or tuning, manages the camera stream and its
//! permission flow, and draws detections over the live video once per frame.
//!
//! The detection engine and the camera are external collaborators reached
//! through the [`engine::DetectionEngine`] and [`camera::CameraPlatform`] traits.

pub mod camera;
pub mod config;
pub mod controls;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame_loop;
pub mod models;
pub mod render;
pub mod status;
pub mod viewer;

pub use config::{FlipPolicy, ModelOption, ViewerConfig};
pub use controls::{ControlEvent, ControlSurface};
pub use detection::{BoundingBox, Category, Detection, DetectionResult};
pub use engine::{Delegate, DetectionEngine, Detector, DetectorOptions, EngineRuntime};
pub use error::{AcquisitionError, DetectorBuildError, FetchError, ViewerError};
pub use frame_loop::{FrameClock, FrameOutcome, IntervalClock, RenderLoop};
pub use render::{RecordingSurface, Surface};
pub use status::{StatusBoard, ViewState};
pub use viewer::{EventOutcome, Viewer, ViewerPhase};
