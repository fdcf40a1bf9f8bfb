//! Per-frame detection results

use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixels, relative to the unflipped frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(origin_x: f32, origin_y: f32, width: f32, height: f32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }
}

/// A scored class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_name: String,
    pub score: f32,
}

impl Category {
    pub fn new(category_name: impl Into<String>, score: f32) -> Self {
        Self {
            category_name: category_name.into(),
            score,
        }
    }
}

/// One detected object. Categories are kept in descending score order and
/// are never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    categories: Vec<Category>,
}

impl Detection {
    /// Returns `None` when `categories` is empty.
    pub fn new(bounding_box: BoundingBox, mut categories: Vec<Category>) -> Option<Self> {
        if categories.is_empty() {
            return None;
        }
        categories.sort_by(|a, b| b.score.total_cmp(&a.score));
        Some(Self {
            bounding_box,
            categories,
        })
    }

    /// Highest-scoring category; the only one rendered.
    pub fn top_category(&self) -> &Category {
        &self.categories[0]
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
}

/// Detections produced for a single frame, in engine order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
