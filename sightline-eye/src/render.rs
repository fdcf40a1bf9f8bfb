//! Overlay drawing onto a 2D surface

use crate::detection::{BoundingBox, Category, DetectionResult};
use serde::Serialize;

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// 2D drawing target.
pub trait Surface {
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);
    /// Rendered width of `text` in pixels.
    fn measure_text(&self, text: &str) -> f32;
}

/// Overlay appearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    pub box_color: Color,
    pub line_width: f32,
    pub label_background: Color,
    pub label_text: Color,
    pub font_px: f32,
    pub label_padding: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            box_color: Color::rgba(0, 255, 127, 255),
            line_width: 3.0,
            label_background: Color::rgba(0, 255, 127, 204),
            label_text: Color::rgba(0, 0, 0, 255),
            font_px: 16.0,
            label_padding: 4.0,
        }
    }
}

/// Left edge of a box on the surface, mirrored when `flipped`.
pub fn display_x(bbox: &BoundingBox, surface_width: f32, flipped: bool) -> f32 {
    if flipped {
        surface_width - bbox.origin_x - bbox.width
    } else {
        bbox.origin_x
    }
}

/// Box in surface coordinates.
pub fn display_rect(bbox: &BoundingBox, surface_width: f32, flipped: bool) -> Rect {
    Rect::new(display_x(bbox, surface_width, flipped), bbox.origin_y, bbox.width, bbox.height)
}

/// "person 87%"
pub fn label_text(category: &Category) -> String {
    format!("{} {}%", category.category_name, (category.score * 100.0).round() as i32)
}

/// Where a `label_width` x `label_height` label goes for `target`.
///
/// Sits above the box, left-aligned. Switches to right-aligned when it would
/// run off the right edge, drops inside the box near the top edge, and is
/// pulled up near the bottom edge. Always clamped inside the surface.
pub fn label_placement(
    target: Rect,
    label_width: f32,
    label_height: f32,
    surface_width: f32,
    surface_height: f32,
) -> Rect {
    let mut x = target.x;
    if x + label_width > surface_width {
        x = target.right() - label_width;
    }
    x = x.min(surface_width - label_width).max(0.0);

    let mut y = target.y - label_height;
    if y < 0.0 {
        y = target.y;
    }
    if y + label_height > surface_height {
        y = surface_height - label_height;
    }
    y = y.max(0.0);

    Rect::new(x, y, label_width, label_height)
}

/// Draw every detection's box and top-category label.
pub fn draw_detections<S: Surface + ?Sized>(
    surface: &mut S,
    result: &DetectionResult,
    flipped: bool,
    style: &RenderStyle,
) {
    let (width, height) = surface.size();
    let (width, height) = (width as f32, height as f32);

    for detection in &result.detections {
        let rect = display_rect(&detection.bounding_box, width, flipped);
        surface.stroke_rect(rect, style.box_color, style.line_width);

        let text = label_text(detection.top_category());
        let label_width = surface.measure_text(&text) + style.label_padding * 2.0;
        let label_height = style.font_px + style.label_padding * 2.0;
        let label = label_placement(rect, label_width, label_height, width, height);

        surface.fill_rect(label, style.label_background);
        surface.fill_text(
            &text,
            label.x + style.label_padding,
            label.y + style.label_padding,
            style.label_text,
        );
    }
}

/// Draw command captured by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear,
    StrokeRect { rect: Rect, color: Color, line_width: f32 },
    FillRect { rect: Rect, color: Color },
    FillText { text: String, x: f32, y: f32, color: Color },
}

/// Surface that records draw commands since the last clear.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    char_width: f32,
    commands: Vec<DrawCommand>,
    resizes: u32,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            char_width: 8.0,
            commands: Vec::new(),
            resizes: 0,
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Outlined boxes of the current frame.
    pub fn stroked_rects(&self) -> Vec<Rect> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::StrokeRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect()
    }

    /// Label texts of the current frame.
    pub fn texts(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillText { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of times the pixel size actually changed.
    pub fn resize_count(&self) -> u32 {
        self.resizes
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.resizes += 1;
        }
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }

    fn measure_text(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.char_width
    }
}
