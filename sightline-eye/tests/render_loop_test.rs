//! Detection/render loop against fake camera and engine

mod common;

use common::{camera, CountingFetcher, FakeEngine, FakePlatform, ManualClock, StreamState};
use sightline_eye::camera::{DeviceManager, FacingMode, PermissionFlow};
use sightline_eye::config::FlipPolicy;
use sightline_eye::engine::Delegate;
use sightline_eye::error::ViewerError;
use sightline_eye::frame_loop::{FrameOutcome, RenderLoop};
use sightline_eye::models::{DetectorManager, ModelCache, ModelParameters, NoProgress};
use sightline_eye::render::{Rect, RecordingSurface, Surface};
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct Harness {
    platform: Arc<FakePlatform>,
    fetcher: Arc<CountingFetcher>,
    engine: Arc<FakeEngine>,
    devices: Arc<DeviceManager>,
    detectors: Arc<DetectorManager>,
    render: RenderLoop<RecordingSurface, ManualClock>,
}

impl Harness {
    async fn new(facing: FacingMode) -> Self {
        let platform = Arc::new(FakePlatform::new(vec![camera("cam", facing)]));
        let devices = Arc::new(DeviceManager::new(platform.clone(), (640, 480), FlipPolicy::FollowDevice));
        let stream = PermissionFlow::new()
            .request(platform.as_ref(), &devices.constraints(None))
            .await
            .unwrap();
        devices.adopt(stream).await;

        let fetcher = Arc::new(CountingFetcher::new());
        let engine = Arc::new(FakeEngine::new());
        let cache = Arc::new(ModelCache::new(fetcher.clone()));
        let detectors = Arc::new(DetectorManager::new(engine.clone(), cache, Delegate::Cpu, true));
        let render = RenderLoop::new(
            devices.clone(),
            detectors.clone(),
            RecordingSurface::new(1, 1),
            ManualClock::new(16.0),
        );

        Self {
            platform,
            fetcher,
            engine,
            devices,
            detectors,
            render,
        }
    }

    fn stream(&self) -> Arc<StreamState> {
        self.platform.last_stream().unwrap()
    }

    async fn build(&self, model: &str) -> Result<(), ViewerError> {
        self.detectors
            .rebuild(ModelParameters::new(model, 1, 0.5), &NoProgress)
            .await
            .map(|_| ())
    }
}

#[tokio::test]
async fn test_no_detector_until_first_build() {
    let mut h = Harness::new(FacingMode::Environment).await;
    assert_eq!(h.render.step(16.0), FrameOutcome::NoDetector);
    // Surface is sized to the video even before any detector exists.
    assert_eq!(h.render.surface().size(), (640, 480));
}

#[tokio::test]
async fn test_user_facing_camera_draws_mirrored_boxes() {
    let mut h = Harness::new(FacingMode::User).await;
    h.build("lite0").await.unwrap();

    assert_eq!(h.render.step(16.0), FrameOutcome::Rendered { detections: 1 });
    assert_eq!(h.render.surface().stroked_rects(), vec![Rect::new(580.0, 20.0, 50.0, 40.0)]);
    assert_eq!(h.render.surface().texts(), vec!["lite0 90%".to_string()]);
}

#[tokio::test]
async fn test_environment_camera_draws_unmirrored_boxes() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();

    h.render.step(16.0);
    assert_eq!(h.render.surface().stroked_rects(), vec![Rect::new(10.0, 20.0, 50.0, 40.0)]);
}

#[tokio::test]
async fn test_manual_flip_applies_on_next_frame() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();
    h.render.step(16.0);

    h.devices.toggle_flip();
    h.stream().advance();
    h.render.step(32.0);
    assert_eq!(h.render.surface().stroked_rects()[0].x, 580.0);
}

#[tokio::test]
async fn test_skips_frame_when_media_time_unchanged() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();

    assert!(matches!(h.render.step(16.0), FrameOutcome::Rendered { .. }));
    assert_eq!(h.render.step(32.0), FrameOutcome::NotAdvanced);
    assert_eq!(h.engine.log.timestamps.lock().len(), 1);

    h.stream().advance();
    assert!(matches!(h.render.step(48.0), FrameOutcome::Rendered { .. }));
    assert_eq!(h.engine.log.timestamps.lock().len(), 2);
}

#[tokio::test]
async fn test_buffering_frame_is_not_processed() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();
    h.stream().set_buffering(true);

    assert_eq!(h.render.step(16.0), FrameOutcome::Buffering);
    assert!(h.engine.log.timestamps.lock().is_empty());

    h.stream().set_buffering(false);
    assert!(matches!(h.render.step(32.0), FrameOutcome::Rendered { .. }));
}

#[tokio::test]
async fn test_no_stream_after_release() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.devices.release().await;
    assert_eq!(h.render.step(16.0), FrameOutcome::NoStream);
}

#[tokio::test]
async fn test_detector_timestamps_strictly_increase() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();

    for now_ms in [100.0, 100.0, 90.0, 150.0] {
        h.stream().advance();
        h.render.step(now_ms);
    }

    let timestamps = h.engine.log.timestamps.lock().clone();
    assert_eq!(timestamps.len(), 4);
    assert!(timestamps.windows(2).all(|w| w[1] > w[0]), "{:?}", timestamps);
}

#[tokio::test]
async fn test_hot_swap_uses_new_detector_on_next_frame() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();
    h.render.step(16.0);
    assert_eq!(h.render.surface().texts(), vec!["lite0 90%".to_string()]);

    h.build("lite2").await.unwrap();
    h.stream().advance();
    h.render.step(32.0);

    assert_eq!(h.render.surface().texts(), vec!["lite2 90%".to_string()]);
    assert_eq!(h.engine.log.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_build_failure_keeps_prior_detector_drawing() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.fetcher.serve("bad", "broken payload");
    h.build("lite0").await.unwrap();
    h.render.step(16.0);

    let result = h.build("bad").await;
    assert!(matches!(result, Err(ViewerError::DetectorBuild(_))));

    h.stream().advance();
    assert_eq!(h.render.step(32.0), FrameOutcome::Rendered { detections: 1 });
    assert_eq!(h.render.surface().texts(), vec!["lite0 90%".to_string()]);
}

#[tokio::test]
async fn test_detect_failure_does_not_stop_loop() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.fetcher.serve("shaky", "flaky model");
    h.build("shaky").await.unwrap();

    assert_eq!(h.render.step(16.0), FrameOutcome::DetectFailed);
    h.build("lite0").await.unwrap();
    h.stream().advance();
    assert!(matches!(h.render.step(32.0), FrameOutcome::Rendered { .. }));
}

#[tokio::test]
async fn test_run_frames_drives_clock() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();

    let outcomes = h.render.run_frames(3).await;
    assert_eq!(
        outcomes,
        vec![
            FrameOutcome::Rendered { detections: 1 },
            FrameOutcome::NotAdvanced,
            FrameOutcome::NotAdvanced,
        ]
    );
    assert_eq!(h.engine.log.timestamps.lock().clone(), vec![16.0]);
}

#[tokio::test]
async fn test_failed_detection_clears_previous_boxes() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.fetcher.serve("shaky", "flaky model");
    h.build("lite0").await.unwrap();
    h.render.step(16.0);
    assert_eq!(h.render.surface().stroked_rects().len(), 1);

    h.build("shaky").await.unwrap();
    h.stream().advance();
    assert_eq!(h.render.step(32.0), FrameOutcome::DetectFailed);
    assert!(h.render.surface().stroked_rects().is_empty());
    assert!(h.render.surface().texts().is_empty());
}

#[tokio::test]
async fn test_unpublished_detector_clears_previous_boxes() {
    let mut h = Harness::new(FacingMode::Environment).await;
    h.build("lite0").await.unwrap();
    h.render.step(16.0);

    h.detectors.shutdown();
    h.stream().advance();
    assert_eq!(h.render.step(32.0), FrameOutcome::NoDetector);
    assert!(h.render.surface().stroked_rects().is_empty());
}
