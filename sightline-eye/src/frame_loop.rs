//! Per-frame detection and overlay loop
//!
//! One iteration per frame tick: sync the surface to the video size, skip
//! frames whose media time has not moved, run whatever detector is currently
//! published, then redraw the overlay. Iterations never overlap.

use crate::camera::DeviceManager;
use crate::models::DetectorManager;
use crate::render::{draw_detections, RenderStyle, Surface};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Source of frame ticks.
#[async_trait]
pub trait FrameClock: Send {
    /// Suspend until the next frame; returns the wall-clock time in milliseconds.
    async fn next_frame(&mut self) -> f64;
}

/// Frame clock driven by a fixed-rate tokio interval.
pub struct IntervalClock {
    interval: Interval,
    started: Instant,
}

impl IntervalClock {
    pub fn new(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) -> f64 {
        let tick = self.interval.tick().await;
        tick.duration_since(self.started).as_secs_f64() * 1000.0
    }
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No camera session is live.
    NoStream,
    /// Media time has not advanced since the last processed frame.
    NotAdvanced,
    /// The current frame is not decodable yet.
    Buffering,
    /// No detector has been published yet.
    NoDetector,
    /// The detector was disposed by a concurrent swap; retried next tick.
    Disposed,
    /// The detector returned an error for this frame.
    DetectFailed,
    /// The overlay was redrawn.
    Rendered { detections: usize },
}

pub struct RenderLoop<S: Surface, C: FrameClock> {
    devices: Arc<DeviceManager>,
    detectors: Arc<DetectorManager>,
    surface: S,
    clock: C,
    style: RenderStyle,
    last_media_time: Option<f64>,
    last_timestamp_ms: Option<f64>,
}

impl<S: Surface, C: FrameClock> RenderLoop<S, C> {
    pub fn new(devices: Arc<DeviceManager>, detectors: Arc<DetectorManager>, surface: S, clock: C) -> Self {
        Self {
            devices,
            detectors,
            surface,
            clock,
            style: RenderStyle::default(),
            last_media_time: None,
            last_timestamp_ms: None,
        }
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Process one frame at wall-clock time `now_ms`.
    pub fn step(&mut self, now_ms: f64) -> FrameOutcome {
        let Some(session) = self.devices.current() else {
            return FrameOutcome::NoStream;
        };

        if let Some((width, height)) = session.video_dimensions() {
            self.sync_size(width, height);
        }

        let media_time = session.current_time();
        if self.last_media_time == Some(media_time) {
            return FrameOutcome::NotAdvanced;
        }

        let Some(frame) = session.current_frame() else {
            return FrameOutcome::Buffering;
        };
        self.sync_size(frame.width, frame.height);

        let Some(detector) = self.detectors.active() else {
            self.surface.clear();
            return FrameOutcome::NoDetector;
        };

        let timestamp_ms = self.next_timestamp(now_ms);
        let previous_media_time = self.last_media_time.replace(media_time);

        match detector.detect(&frame, timestamp_ms) {
            None => {
                debug!("Detector generation {} disposed mid-frame", detector.generation());
                self.last_media_time = previous_media_time;
                FrameOutcome::Disposed
            }
            Some(Err(e)) => {
                warn!("Detection failed at {:.1}ms: {:#}", timestamp_ms, e);
                self.surface.clear();
                FrameOutcome::DetectFailed
            }
            Some(Ok(result)) => {
                self.surface.clear();
                draw_detections(&mut self.surface, &result, self.devices.is_flipped(), &self.style);
                FrameOutcome::Rendered {
                    detections: result.len(),
                }
            }
        }
    }

    /// Run `frames` iterations against the frame clock.
    pub async fn run_frames(&mut self, frames: usize) -> Vec<FrameOutcome> {
        let mut outcomes = Vec::with_capacity(frames);
        for _ in 0..frames {
            let now_ms = self.clock.next_frame().await;
            outcomes.push(self.step(now_ms));
        }
        outcomes
    }

    /// Run until the task is dropped.
    pub async fn run(mut self) {
        loop {
            let now_ms = self.clock.next_frame().await;
            self.step(now_ms);
        }
    }

    fn sync_size(&mut self, width: u32, height: u32) {
        if self.surface.size() != (width, height) {
            debug!("Resizing surface to {}x{}", width, height);
            self.surface.resize(width, height);
        }
    }

    // The engine rejects timestamps that do not strictly increase.
    fn next_timestamp(&mut self, now_ms: f64) -> f64 {
        let timestamp = match self.last_timestamp_ms {
            Some(last) if now_ms <= last => last + 1.0,
            _ => now_ms,
        };
        self.last_timestamp_ms = Some(timestamp);
        timestamp
    }
}
