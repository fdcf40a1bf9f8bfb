//! User-facing control state
//!
//! Continuous controls keep two values: the displayed one, updated on every
//! drag tick, and the committed one, updated only when the user settles.
//! Only committed values ever reach the detector manager.

use crate::camera::DeviceDescriptor;
use crate::config::{ModelOption, ViewerConfig};
use crate::error::ViewerError;
use crate::models::ModelParameters;

/// Input from the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    ModelSelected(String),
    MaxResultsChanged(u32),
    MaxResultsCommitted(u32),
    ScoreThresholdChanged(f32),
    ScoreThresholdCommitted(f32),
    CameraSelected(String),
    FlipToggled,
    PermissionRetry,
}

#[derive(Debug, Clone)]
pub struct ControlSurface {
    models: Vec<ModelOption>,
    selected_model: String,
    max_results_range: (u32, u32),
    displayed_max_results: u32,
    committed_max_results: u32,
    displayed_score_threshold: f32,
    committed_score_threshold: f32,
    cameras: Vec<DeviceDescriptor>,
    selected_camera: Option<String>,
    flipped: bool,
}

impl ControlSurface {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            models: config.models.clone(),
            selected_model: config.default_model.clone(),
            max_results_range: config.max_results_range,
            displayed_max_results: config.max_results,
            committed_max_results: config.max_results,
            displayed_score_threshold: config.score_threshold,
            committed_score_threshold: config.score_threshold,
            cameras: Vec::new(),
            selected_camera: None,
            flipped: false,
        }
    }

    pub fn models(&self) -> &[ModelOption] {
        &self.models
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Select a model by path or display name.
    pub fn select_model(&mut self, key: &str) -> Result<&ModelOption, ViewerError> {
        let index = self
            .models
            .iter()
            .position(|m| m.path == key)
            .or_else(|| self.models.iter().position(|m| m.name.eq_ignore_ascii_case(key)))
            .ok_or_else(|| ViewerError::InvalidControl(format!("unknown model {:?}", key)))?;
        self.selected_model = self.models[index].path.clone();
        Ok(&self.models[index])
    }

    /// Drag tick. Only the label moves.
    pub fn preview_max_results(&mut self, value: u32) -> u32 {
        self.displayed_max_results = self.clamp_max_results(value);
        self.displayed_max_results
    }

    pub fn commit_max_results(&mut self, value: u32) -> u32 {
        let value = self.clamp_max_results(value);
        self.displayed_max_results = value;
        self.committed_max_results = value;
        value
    }

    pub fn preview_score_threshold(&mut self, value: f32) -> Result<f32, ViewerError> {
        self.displayed_score_threshold = clamp_threshold(value)?;
        Ok(self.displayed_score_threshold)
    }

    pub fn commit_score_threshold(&mut self, value: f32) -> Result<f32, ViewerError> {
        let value = clamp_threshold(value)?;
        self.displayed_score_threshold = value;
        self.committed_score_threshold = value;
        Ok(value)
    }

    pub fn displayed_max_results(&self) -> u32 {
        self.displayed_max_results
    }

    pub fn displayed_score_threshold(&self) -> f32 {
        self.displayed_score_threshold
    }

    pub fn max_results_label(&self) -> String {
        self.displayed_max_results.to_string()
    }

    pub fn score_threshold_label(&self) -> String {
        format!("{:.2}", self.displayed_score_threshold)
    }

    /// Parameters the committed control values ask for.
    pub fn requested_parameters(&self) -> ModelParameters {
        ModelParameters::new(
            self.selected_model.clone(),
            self.committed_max_results,
            self.committed_score_threshold,
        )
    }

    pub fn set_cameras(&mut self, cameras: Vec<DeviceDescriptor>) {
        if let Some(selected) = &self.selected_camera {
            if !cameras.iter().any(|c| &c.device_id == selected) {
                self.selected_camera = None;
            }
        }
        self.cameras = cameras;
    }

    pub fn cameras(&self) -> &[DeviceDescriptor] {
        &self.cameras
    }

    /// The selector is hidden when there is nothing to choose between.
    pub fn camera_selector_visible(&self) -> bool {
        self.cameras.len() > 1
    }

    pub fn selected_camera(&self) -> Option<&str> {
        self.selected_camera.as_deref()
    }

    pub fn select_camera(&mut self, device_id: &str) -> Result<&DeviceDescriptor, ViewerError> {
        let camera = self
            .cameras
            .iter()
            .find(|c| c.device_id == device_id)
            .ok_or_else(|| ViewerError::InvalidControl(format!("unknown camera {:?}", device_id)))?;
        self.selected_camera = Some(camera.device_id.clone());
        Ok(camera)
    }

    /// Record the camera actually bound after a switch.
    pub fn set_selected_camera(&mut self, device_id: Option<&str>) {
        self.selected_camera = device_id.map(str::to_string);
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn set_flipped(&mut self, flipped: bool) {
        self.flipped = flipped;
    }

    fn clamp_max_results(&self, value: u32) -> u32 {
        let (min, max) = self.max_results_range;
        value.clamp(min, max)
    }
}

fn clamp_threshold(value: f32) -> Result<f32, ViewerError> {
    if value.is_nan() {
        return Err(ViewerError::InvalidControl("score threshold is NaN".to_string()));
    }
    Ok(value.clamp(0.0, 1.0))
}
