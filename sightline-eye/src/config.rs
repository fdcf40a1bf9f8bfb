//! Configuration for sightline-eye

use crate::engine::Delegate;
use crate::error::ViewerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const MODEL_BUCKET: &str = "https://storage.googleapis.com/mediapipe-models/object_detector";

/// A selectable model: display name plus the fetchable path that identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub name: String,
    pub path: String,
}

impl ModelOption {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// What happens to an explicit flip toggle when the camera changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipPolicy {
    /// Re-derive flip from the new camera's facing mode.
    #[default]
    FollowDevice,
    /// Keep the user's last explicit toggle across camera switches.
    PreserveUserChoice,
}

/// Viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Selectable models
    pub models: Vec<ModelOption>,
    /// Path of the model loaded at startup
    pub default_model: String,
    /// Initial max results
    pub max_results: u32,
    /// Inclusive (min, max) range of the max-results control
    pub max_results_range: (u32, u32),
    /// Initial score threshold in [0, 1]
    pub score_threshold: f32,
    /// Hardware delegate requested from the engine
    pub delegate: Delegate,
    /// Camera resolution hint (width, height)
    pub resolution: (u32, u32),
    /// Frame clock rate used when no display refresh signal is available
    pub frame_rate: u32,
    /// Flip behaviour across camera switches
    pub flip_policy: FlipPolicy,
    /// Drop rebuild results that finish after a newer rebuild already published
    pub discard_stale_rebuilds: bool,
    /// Base URL for relative model paths
    pub model_base_url: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let models = vec![
            ModelOption::new(
                "EfficientDet-Lite0 (float 16)",
                format!("{}/efficientdet_lite0/float16/1/efficientdet_lite0.tflite", MODEL_BUCKET),
            ),
            ModelOption::new(
                "EfficientDet-Lite0 (int8)",
                format!("{}/efficientdet_lite0/int8/1/efficientdet_lite0.tflite", MODEL_BUCKET),
            ),
            ModelOption::new(
                "EfficientDet-Lite2 (float 16)",
                format!("{}/efficientdet_lite2/float16/1/efficientdet_lite2.tflite", MODEL_BUCKET),
            ),
            ModelOption::new(
                "SSD MobileNetV2 (float 32)",
                format!("{}/ssd_mobilenet_v2/float32/1/ssd_mobilenet_v2.tflite", MODEL_BUCKET),
            ),
        ];
        let default_model = models[0].path.clone();

        Self {
            models,
            default_model,
            max_results: 5,
            max_results_range: (1, 10),
            score_threshold: 0.5,
            delegate: Delegate::Gpu,
            resolution: (1280, 720),
            frame_rate: 60,
            flip_policy: FlipPolicy::FollowDevice,
            discard_stale_rebuilds: true,
            model_base_url: None,
        }
    }
}

impl ViewerConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ViewerError> {
        toml::from_str(raw).map_err(|e| ViewerError::Config(format!("invalid config: {}", e)))
    }

    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ViewerError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw)?;
        config.validate().map_err(ViewerError::Config)?;
        Ok(config)
    }

    /// Look up a model option by path or display name.
    pub fn find_model(&self, key: &str) -> Option<&ModelOption> {
        self.models
            .iter()
            .find(|m| m.path == key)
            .or_else(|| self.models.iter().find(|m| m.name.eq_ignore_ascii_case(key)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.models.is_empty() {
            return Err("At least one model must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.path.trim().is_empty() {
                return Err(format!("Model {:?} has an empty path", model.name));
            }
            if !seen.insert(model.path.as_str()) {
                return Err(format!("Duplicate model path {}", model.path));
            }
        }

        if !self.models.iter().any(|m| m.path == self.default_model) {
            return Err(format!("Default model {} is not a configured model", self.default_model));
        }

        let (min, max) = self.max_results_range;
        if min == 0 || min > max {
            return Err("Max results range must satisfy 1 <= min <= max".to_string());
        }
        if self.max_results < min || self.max_results > max {
            return Err(format!("Max results must be between {} and {}", min, max));
        }

        if !self.score_threshold.is_finite() || !(0.0..=1.0).contains(&self.score_threshold) {
            return Err("Score threshold must be between 0 and 1".to_string());
        }

        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err("Resolution must be non-zero".to_string());
        }
        if self.resolution.0 > 7680 || self.resolution.1 > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }

        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err("Frame rate must be between 1 and 240".to_string());
        }

        Ok(())
    }
}
