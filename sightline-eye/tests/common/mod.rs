//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sightline_eye::camera::{
    CameraPlatform, DeviceKind, FacingMode, MediaDeviceInfo, MediaStream, StreamConstraints, VideoFrame,
};
use sightline_eye::detection::{BoundingBox, Category, Detection, DetectionResult};
use sightline_eye::engine::{DetectionEngine, Detector, DetectorOptions, EngineRuntime};
use sightline_eye::error::{AcquisitionError, FetchError};
use sightline_eye::frame_loop::FrameClock;
use sightline_eye::models::{DownloadProgress, ModelFetcher, ProgressObserver};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn camera(device_id: &str, facing_mode: FacingMode) -> MediaDeviceInfo {
    MediaDeviceInfo {
        device_id: device_id.to_string(),
        label: format!("Camera {}", device_id),
        kind: DeviceKind::VideoInput,
        facing_mode,
    }
}

pub fn microphone(device_id: &str) -> MediaDeviceInfo {
    MediaDeviceInfo {
        device_id: device_id.to_string(),
        label: "Microphone".to_string(),
        kind: DeviceKind::AudioInput,
        facing_mode: FacingMode::Unknown,
    }
}

/// Observable state of one fake capture stream.
pub struct StreamState {
    pub device_id: String,
    pub facing_mode: FacingMode,
    live: AtomicBool,
    media_time: Mutex<f64>,
    buffering: AtomicBool,
    dimensions: (u32, u32),
}

impl StreamState {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Move the media timeline forward by one frame.
    pub fn advance(&self) {
        *self.media_time.lock() += 1.0 / 30.0;
    }

    pub fn set_buffering(&self, buffering: bool) {
        self.buffering.store(buffering, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    state: Arc<StreamState>,
}

#[async_trait]
impl MediaStream for FakeStream {
    fn device_id(&self) -> Option<String> {
        Some(self.state.device_id.clone())
    }

    fn facing_mode(&self) -> FacingMode {
        self.state.facing_mode
    }

    fn video_dimensions(&self) -> Option<(u32, u32)> {
        Some(self.state.dimensions)
    }

    fn current_time(&self) -> f64 {
        *self.state.media_time.lock()
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if self.state.buffering.load(Ordering::SeqCst) || !self.state.is_live() {
            return None;
        }
        let (width, height) = self.state.dimensions;
        Some(VideoFrame {
            width,
            height,
            media_time: self.current_time(),
            data: Bytes::from_static(&[0u8; 4]),
        })
    }

    async fn stop(&self) {
        tokio::task::yield_now().await;
        self.state.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

/// Scripted camera platform. Acquisition replies are consumed in order and
/// default to success once the script runs out. Like real hardware, a camera
/// cannot be opened twice.
pub struct FakePlatform {
    devices: Vec<MediaDeviceInfo>,
    replies: Mutex<VecDeque<Result<(), AcquisitionError>>>,
    streams: Mutex<Vec<Arc<StreamState>>>,
    enumerate_calls: AtomicUsize,
    acquire_calls: AtomicUsize,
    dimensions: (u32, u32),
}

impl FakePlatform {
    pub fn new(devices: Vec<MediaDeviceInfo>) -> Self {
        Self {
            devices,
            replies: Mutex::new(VecDeque::new()),
            streams: Mutex::new(Vec::new()),
            enumerate_calls: AtomicUsize::new(0),
            acquire_calls: AtomicUsize::new(0),
            dimensions: (640, 480),
        }
    }

    pub fn with_replies(self, replies: Vec<Result<(), AcquisitionError>>) -> Self {
        *self.replies.lock() = replies.into();
        self
    }

    pub fn push_reply(&self, reply: Result<(), AcquisitionError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn streams(&self) -> Vec<Arc<StreamState>> {
        self.streams.lock().clone()
    }

    pub fn live_streams(&self) -> Vec<Arc<StreamState>> {
        self.streams.lock().iter().filter(|s| s.is_live()).cloned().collect()
    }

    pub fn last_stream(&self) -> Option<Arc<StreamState>> {
        self.streams.lock().last().cloned()
    }
}

#[async_trait]
impl CameraPlatform for FakePlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, AcquisitionError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }

    async fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>, AcquisitionError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().pop_front();
        if let Some(Err(e)) = reply {
            return Err(e);
        }

        let device = match &constraints.device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| d.kind == DeviceKind::VideoInput && &d.device_id == id)
                .ok_or_else(|| AcquisitionError::DeviceNotFound(id.clone()))?,
            None => self
                .devices
                .iter()
                .find(|d| d.kind == DeviceKind::VideoInput)
                .ok_or_else(|| AcquisitionError::DeviceNotFound("any".to_string()))?,
        };

        if !self.live_streams().is_empty() {
            return Err(AcquisitionError::DeviceInUse(device.device_id.clone()));
        }

        let state = Arc::new(StreamState {
            device_id: device.device_id.clone(),
            facing_mode: device.facing_mode,
            live: AtomicBool::new(true),
            media_time: Mutex::new(0.0),
            buffering: AtomicBool::new(false),
            dimensions: self.dimensions,
        });
        self.streams.lock().push(state.clone());
        Ok(Box::new(FakeStream { state }))
    }
}

/// Shared counters for detectors built by [`FakeEngine`].
#[derive(Default)]
pub struct EngineLog {
    pub built: AtomicUsize,
    pub disposed: AtomicUsize,
    pub timestamps: Mutex<Vec<f64>>,
    pub options: Mutex<Vec<DetectorOptions>>,
}

struct FakeDetector {
    label: String,
    max_results: u32,
    log: Arc<EngineLog>,
    fail_detect: bool,
}

impl Detector for FakeDetector {
    fn detect(&mut self, _frame: &VideoFrame, timestamp_ms: f64) -> anyhow::Result<DetectionResult> {
        self.log.timestamps.lock().push(timestamp_ms);
        if self.fail_detect {
            anyhow::bail!("inference failed");
        }
        let detections = (0..self.max_results.min(2))
            .filter_map(|i| {
                Detection::new(
                    BoundingBox::new(10.0 + i as f32 * 100.0, 20.0, 50.0, 40.0),
                    vec![Category::new(self.label.clone(), 0.9)],
                )
            })
            .collect();
        Ok(DetectionResult::new(detections))
    }

    fn dispose(&mut self) {
        self.log.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine whose detectors label everything with the model payload text.
/// Payloads starting with `broken` fail to build; `flaky` ones fail to detect.
pub struct FakeEngine {
    pub log: Arc<EngineLog>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            log: Arc::new(EngineLog::default()),
        }
    }
}

impl DetectionEngine for FakeEngine {
    fn build(&self, model: Bytes, options: &DetectorOptions) -> anyhow::Result<Box<dyn Detector>> {
        let label = String::from_utf8_lossy(&model).to_string();
        if label.starts_with("broken") {
            anyhow::bail!("model buffer is malformed");
        }
        self.log.built.fetch_add(1, Ordering::SeqCst);
        self.log.options.lock().push(options.clone());
        Ok(Box::new(FakeDetector {
            fail_detect: label.starts_with("flaky"),
            label,
            max_results: options.max_results,
            log: self.log.clone(),
        }))
    }
}

pub struct FakeRuntime {
    engine: Option<Arc<FakeEngine>>,
}

impl FakeRuntime {
    pub fn ready(engine: Arc<FakeEngine>) -> Self {
        Self { engine: Some(engine) }
    }

    pub fn missing() -> Self {
        Self { engine: None }
    }
}

#[async_trait]
impl EngineRuntime for FakeRuntime {
    async fn load(&self) -> anyhow::Result<Arc<dyn DetectionEngine>> {
        match &self.engine {
            Some(engine) => Ok(engine.clone()),
            None => Err(anyhow::anyhow!("wasm module not found").context("loading vision runtime")),
        }
    }
}

/// Fetcher serving configured payloads and counting network reads.
pub struct CountingFetcher {
    payloads: Mutex<HashMap<String, Bytes>>,
    missing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self {
            payloads: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `payload` for `path` instead of the default.
    pub fn serve(&self, path: &str, payload: &str) {
        self.payloads
            .lock()
            .insert(path.to_string(), Bytes::from(payload.to_string()));
    }

    /// Answer `path` with HTTP 404.
    pub fn fail(&self, path: &str) {
        self.missing.lock().insert(path.to_string());
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ModelFetcher for CountingFetcher {
    async fn fetch(&self, path: &str, observer: &dyn ProgressObserver) -> Result<Bytes, FetchError> {
        *self.calls.lock().entry(path.to_string()).or_insert(0) += 1;
        tokio::task::yield_now().await;

        if self.missing.lock().contains(path) {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: 404,
                reason: Some("Not Found"),
            });
        }

        let payload = self
            .payloads
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Bytes::from(model_label(path)));
        observer.on_progress(DownloadProgress {
            bytes_loaded: payload.len() as u64,
            bytes_total: Some(payload.len() as u64),
        });
        Ok(payload)
    }
}

/// Default payload for a model path: its file stem.
pub fn model_label(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.split('.').next().unwrap_or(file).to_string()
}

/// Frame clock advancing by a fixed step, with no real waiting.
pub struct ManualClock {
    now_ms: f64,
    step_ms: f64,
}

impl ManualClock {
    pub fn new(step_ms: f64) -> Self {
        Self { now_ms: 0.0, step_ms }
    }
}

#[async_trait]
impl FrameClock for ManualClock {
    async fn next_frame(&mut self) -> f64 {
        self.now_ms += self.step_ms;
        self.now_ms
    }
}
