//! Detection engine seam
//!
//! The inference engine is an external collaborator. The viewer only needs to
//! build an instance from a model payload, run it against frames and dispose
//! of it. Engines report failures through `anyhow`; the managers convert them
//! into typed errors at the boundary.

use crate::camera::VideoFrame;
use crate::detection::DetectionResult;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hardware delegate requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    #[default]
    Gpu,
    Cpu,
}

/// Options passed to the engine when building an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    pub delegate: Delegate,
    pub max_results: u32,
    pub score_threshold: f32,
}

/// A built detection-engine instance.
pub trait Detector: Send {
    /// Run detection on one frame. `timestamp_ms` is strictly increasing
    /// across calls on the same instance.
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: f64) -> Result<DetectionResult>;

    /// Release engine resources. Called exactly once, before the instance is dropped.
    fn dispose(&mut self) {}
}

/// Builds detector instances from model payloads.
pub trait DetectionEngine: Send + Sync {
    fn build(&self, model: Bytes, options: &DetectorOptions) -> Result<Box<dyn Detector>>;
}

/// Locates and initializes the engine runtime. A failure here is fatal for
/// the viewer, unlike a failure to build one particular model.
#[async_trait]
pub trait EngineRuntime: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn DetectionEngine>>;
}

/// Runtime that is already resident in the process.
pub struct PreloadedRuntime {
    engine: Arc<dyn DetectionEngine>,
}

impl PreloadedRuntime {
    pub fn new(engine: Arc<dyn DetectionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EngineRuntime for PreloadedRuntime {
    async fn load(&self) -> Result<Arc<dyn DetectionEngine>> {
        Ok(self.engine.clone())
    }
}
