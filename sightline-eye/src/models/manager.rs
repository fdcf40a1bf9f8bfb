//! Detector manager with model hot-swap

use crate::camera::VideoFrame;
use crate::detection::DetectionResult;
use crate::engine::{Delegate, DetectionEngine, Detector, DetectorOptions};
use crate::error::{DetectorBuildError, ViewerError};
use crate::models::cache::ModelCache;
use crate::models::fetcher::ProgressObserver;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of everything a detector is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model_identifier: String,
    pub max_results: u32,
    pub score_threshold: f32,
}

impl ModelParameters {
    pub fn new(model_identifier: impl Into<String>, max_results: u32, score_threshold: f32) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            max_results,
            score_threshold,
        }
    }

    pub fn with_model(&self, model_identifier: impl Into<String>) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            ..self.clone()
        }
    }

    pub fn with_max_results(&self, max_results: u32) -> Self {
        Self {
            max_results,
            ..self.clone()
        }
    }

    pub fn with_score_threshold(&self, score_threshold: f32) -> Self {
        Self {
            score_threshold,
            ..self.clone()
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.max_results == 0 {
            return Err("max results must be positive".to_string());
        }
        if !self.score_threshold.is_finite() || !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(format!("score threshold {} outside [0, 1]", self.score_threshold));
        }
        Ok(())
    }
}

/// The published detector. Once disposed it never runs again.
pub struct ActiveDetector {
    parameters: ModelParameters,
    generation: u64,
    instance: Mutex<Option<Box<dyn Detector>>>,
}

impl ActiveDetector {
    fn new(parameters: ModelParameters, generation: u64, instance: Box<dyn Detector>) -> Self {
        Self {
            parameters,
            generation,
            instance: Mutex::new(Some(instance)),
        }
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the instance on a frame; `None` if it has already been disposed.
    pub fn detect(&self, frame: &VideoFrame, timestamp_ms: f64) -> Option<anyhow::Result<DetectionResult>> {
        let mut guard = self.instance.lock();
        guard.as_mut().map(|detector| detector.detect(frame, timestamp_ms))
    }

    pub fn is_disposed(&self) -> bool {
        self.instance.lock().is_none()
    }

    /// Waits for an in-flight `detect` to finish, then releases the instance.
    fn dispose(&self) {
        let taken = self.instance.lock().take();
        if let Some(mut detector) = taken {
            detector.dispose();
            debug!(
                "Disposed detector generation {} ({})",
                self.generation, self.parameters.model_identifier
            );
        }
    }
}

/// Result of a rebuild request.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildOutcome {
    /// A new detector was published with these parameters.
    Applied(ModelParameters),
    /// The parameters equal the last applied snapshot; nothing was rebuilt.
    Unchanged,
    /// A newer request published first or asked for the already active
    /// parameters; this result was discarded.
    Superseded,
}

/// Owns the single active detector and rebuilds it on demand.
pub struct DetectorManager {
    engine: Arc<dyn DetectionEngine>,
    cache: Arc<ModelCache>,
    delegate: Delegate,
    discard_stale: bool,
    active: RwLock<Option<Arc<ActiveDetector>>>,
    next_generation: AtomicU64,
    // Rebuilds with a generation below this never publish.
    stale_below: AtomicU64,
}

impl DetectorManager {
    pub fn new(
        engine: Arc<dyn DetectionEngine>,
        cache: Arc<ModelCache>,
        delegate: Delegate,
        discard_stale: bool,
    ) -> Self {
        Self {
            engine,
            cache,
            delegate,
            discard_stale,
            active: RwLock::new(None),
            next_generation: AtomicU64::new(0),
            stale_below: AtomicU64::new(0),
        }
    }

    /// Currently published detector, if any.
    pub fn active(&self) -> Option<Arc<ActiveDetector>> {
        self.active.read().clone()
    }

    /// Parameters of the currently published detector.
    pub fn last_applied(&self) -> Option<ModelParameters> {
        self.active.read().as_ref().map(|a| a.parameters().clone())
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Rebuild only when `parameters` differ from the last applied snapshot.
    pub async fn rebuild_if_changed(
        &self,
        parameters: ModelParameters,
        observer: &dyn ProgressObserver,
    ) -> Result<RebuildOutcome, ViewerError> {
        if self.last_applied().as_ref() == Some(&parameters) {
            debug!("Rebuild skipped, parameters unchanged: {:?}", parameters);
            return Ok(self.supersede_pending());
        }
        self.rebuild(parameters, observer).await
    }

    /// Record a request that resolved to the active parameters. Rebuilds
    /// still in flight were asked for earlier and are discarded when they
    /// finish.
    pub fn supersede_pending(&self) -> RebuildOutcome {
        if self.discard_stale {
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.stale_below.fetch_max(generation, Ordering::SeqCst);
        }
        RebuildOutcome::Unchanged
    }

    /// Resolve the payload, build a new instance, publish it and dispose the
    /// previous one. On any failure the previous detector stays active.
    pub async fn rebuild(
        &self,
        parameters: ModelParameters,
        observer: &dyn ProgressObserver,
    ) -> Result<RebuildOutcome, ViewerError> {
        parameters.check().map_err(|reason| DetectorBuildError {
            model: parameters.model_identifier.clone(),
            reason,
        })?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Rebuilding detector generation {}: {} (max_results={}, threshold={:.2})",
            generation, parameters.model_identifier, parameters.max_results, parameters.score_threshold
        );

        let payload = self
            .cache
            .get_or_fetch(&parameters.model_identifier, observer)
            .await?;

        let options = DetectorOptions {
            delegate: self.delegate,
            max_results: parameters.max_results,
            score_threshold: parameters.score_threshold,
        };
        let instance = self.engine.build(payload, &options).map_err(|e| {
            warn!("Detector build failed for {}: {:#}", parameters.model_identifier, e);
            DetectorBuildError {
                model: parameters.model_identifier.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        let candidate = Arc::new(ActiveDetector::new(parameters.clone(), generation, instance));
        let previous = {
            let mut active = self.active.write();
            let newer_published = active
                .as_ref()
                .is_some_and(|current| current.generation() > generation);
            let newer_requested = generation < self.stale_below.load(Ordering::SeqCst);
            if self.discard_stale && (newer_published || newer_requested) {
                None
            } else {
                Some(active.replace(candidate.clone()))
            }
        };

        match previous {
            None => {
                info!("Discarding stale detector generation {}", generation);
                candidate.dispose();
                Ok(RebuildOutcome::Superseded)
            }
            Some(old) => {
                if let Some(old) = old {
                    old.dispose();
                }
                info!("Published detector generation {}", generation);
                Ok(RebuildOutcome::Applied(parameters))
            }
        }
    }

    /// Unpublish and dispose the active detector.
    pub fn shutdown(&self) {
        let previous = self.active.write().take();
        if let Some(previous) = previous {
            previous.dispose();
        }
    }
}

impl Drop for DetectorManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
