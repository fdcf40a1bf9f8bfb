//! Viewer orchestration: startup, permission gating and control handling

use crate::camera::{CameraPlatform, DeviceManager, PermissionFlow, StreamSession};
use crate::config::ViewerConfig;
use crate::controls::{ControlEvent, ControlSurface};
use crate::engine::EngineRuntime;
use crate::error::{AcquisitionError, ViewerError};
use crate::frame_loop::{FrameClock, RenderLoop};
use crate::models::{DetectorManager, HttpModelFetcher, ModelCache, ModelFetcher, RebuildOutcome};
use crate::render::Surface;
use crate::status::StatusBoard;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

/// Lifecycle phase of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Created,
    Loading,
    AwaitingPermission,
    Running,
    Failed,
}

/// What handling a control event did.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Only the displayed value changed.
    Previewed,
    /// Value stored; it applies once setup completes.
    Deferred,
    Rebuilt(RebuildOutcome),
    CameraSwitched(Option<String>),
    Flipped(bool),
    /// Camera access is denied and the permission overlay is showing.
    AwaitingPermission,
    /// Setup completed after a permission retry.
    Started,
    Ignored,
}

pub struct Viewer {
    config: ViewerConfig,
    runtime: Arc<dyn EngineRuntime>,
    cache: Arc<ModelCache>,
    devices: Arc<DeviceManager>,
    permission: PermissionFlow,
    detectors: OnceLock<Arc<DetectorManager>>,
    controls: RwLock<ControlSurface>,
    status: StatusBoard,
    phase: RwLock<ViewerPhase>,
    pending_rebuilds: AtomicUsize,
}

impl Viewer {
    pub fn new(
        config: ViewerConfig,
        platform: Arc<dyn CameraPlatform>,
        runtime: Arc<dyn EngineRuntime>,
        fetcher: Arc<dyn ModelFetcher>,
    ) -> Result<Self, ViewerError> {
        config.validate().map_err(ViewerError::Config)?;

        let devices = Arc::new(DeviceManager::new(platform, config.resolution, config.flip_policy));
        let controls = ControlSurface::from_config(&config);

        Ok(Self {
            runtime,
            cache: Arc::new(ModelCache::new(fetcher)),
            devices,
            permission: PermissionFlow::new(),
            detectors: OnceLock::new(),
            controls: RwLock::new(controls),
            status: StatusBoard::new(),
            phase: RwLock::new(ViewerPhase::Created),
            pending_rebuilds: AtomicUsize::new(0),
            config,
        })
    }

    /// Viewer fetching models over HTTP, relative to `model_base_url` if set.
    pub fn with_http_fetcher(
        config: ViewerConfig,
        platform: Arc<dyn CameraPlatform>,
        runtime: Arc<dyn EngineRuntime>,
    ) -> Result<Self, ViewerError> {
        let mut fetcher = HttpModelFetcher::new();
        if let Some(base_url) = &config.model_base_url {
            fetcher = fetcher.with_base_url(base_url)?;
        }
        Self::new(config, platform, runtime, Arc::new(fetcher))
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn phase(&self) -> ViewerPhase {
        *self.phase.read()
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    pub fn permission(&self) -> &PermissionFlow {
        &self.permission
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn detector_manager(&self) -> Option<&Arc<DetectorManager>> {
        self.detectors.get()
    }

    /// Snapshot of the control surface.
    pub fn controls(&self) -> ControlSurface {
        self.controls.read().clone()
    }

    /// Load the engine runtime, obtain camera permission, enumerate cameras
    /// and build the initial detector.
    ///
    /// A permission denial is not an error: the viewer waits in
    /// [`ViewerPhase::AwaitingPermission`] until a [`ControlEvent::PermissionRetry`].
    /// Every other failure is fatal and leaves a diagnostic on the status board.
    pub async fn start(&self) -> Result<ViewerPhase, ViewerError> {
        {
            let mut phase = self.phase.write();
            if *phase != ViewerPhase::Created {
                return Err(ViewerError::NotReady(format!("viewer already started ({:?})", *phase)));
            }
            *phase = ViewerPhase::Loading;
        }

        info!("Starting viewer");
        self.status.show_full_page("Loading detection runtime");

        let engine = match self.runtime.load().await {
            Ok(engine) => engine,
            Err(e) => {
                let err = ViewerError::CriticalDependencyLoad(format!("{:#}", e));
                return Err(self.fail_setup("Detection runtime failed to load", err));
            }
        };
        let detectors = Arc::new(DetectorManager::new(
            engine,
            self.cache.clone(),
            self.config.delegate,
            self.config.discard_stale_rebuilds,
        ));
        self.detectors
            .set(detectors)
            .map_err(|_| ViewerError::NotReady("detection runtime already loaded".to_string()))?;

        self.acquire_and_finish_setup().await
    }

    /// Apply one control event.
    ///
    /// Rebuild and camera failures are reported through the status board and
    /// returned, but never stop a running viewer.
    pub async fn handle(&self, event: ControlEvent) -> Result<EventOutcome, ViewerError> {
        let phase = self.phase();
        match phase {
            ViewerPhase::Created | ViewerPhase::Loading => {
                return Err(ViewerError::NotReady(format!("viewer is {:?}", phase)));
            }
            ViewerPhase::Failed => {
                return Err(ViewerError::NotReady("viewer failed to start".to_string()));
            }
            ViewerPhase::AwaitingPermission | ViewerPhase::Running => {}
        }
        let running = phase == ViewerPhase::Running;
        debug!("Handling {:?} in {:?}", event, phase);

        match event {
            ControlEvent::MaxResultsChanged(value) => {
                self.controls.write().preview_max_results(value);
                Ok(EventOutcome::Previewed)
            }
            ControlEvent::ScoreThresholdChanged(value) => {
                self.controls.write().preview_score_threshold(value)?;
                Ok(EventOutcome::Previewed)
            }
            ControlEvent::MaxResultsCommitted(value) => {
                self.controls.write().commit_max_results(value);
                self.apply_if_running(running).await
            }
            ControlEvent::ScoreThresholdCommitted(value) => {
                self.controls.write().commit_score_threshold(value)?;
                self.apply_if_running(running).await
            }
            ControlEvent::ModelSelected(key) => {
                self.controls.write().select_model(&key)?;
                self.apply_if_running(running).await
            }
            ControlEvent::CameraSelected(device_id) => {
                if !running {
                    return Ok(EventOutcome::AwaitingPermission);
                }
                self.controls.write().select_camera(&device_id)?;
                let bound = self.devices.current().and_then(|s| s.device_id().map(str::to_string));
                if bound.as_deref() == Some(device_id.as_str()) {
                    return Ok(EventOutcome::Ignored);
                }
                self.switch_camera(Some(&device_id)).await
            }
            ControlEvent::FlipToggled => {
                let flipped = self.devices.toggle_flip();
                self.controls.write().set_flipped(flipped);
                Ok(EventOutcome::Flipped(flipped))
            }
            ControlEvent::PermissionRetry => {
                if running {
                    return Ok(EventOutcome::Ignored);
                }
                match self.acquire_and_finish_setup().await? {
                    ViewerPhase::Running => Ok(EventOutcome::Started),
                    _ => Ok(EventOutcome::AwaitingPermission),
                }
            }
        }
    }

    /// Render loop bound to this viewer's camera and detector.
    pub fn render_loop<S: Surface, C: FrameClock>(
        &self,
        surface: S,
        clock: C,
    ) -> Result<RenderLoop<S, C>, ViewerError> {
        let detectors = self
            .detectors
            .get()
            .cloned()
            .ok_or_else(|| ViewerError::NotReady("detection runtime not loaded".to_string()))?;
        Ok(RenderLoop::new(self.devices.clone(), detectors, surface, clock))
    }

    /// Stop the camera and dispose the detector.
    pub async fn shutdown(&self) {
        self.devices.release().await;
        if let Some(detectors) = self.detectors.get() {
            detectors.shutdown();
        }
        info!("Viewer shut down");
    }

    async fn acquire_and_finish_setup(&self) -> Result<ViewerPhase, ViewerError> {
        self.status.show_full_page("Requesting camera access");
        let constraints = self.devices.constraints(None);

        let stream = match self.permission.request(self.devices.platform().as_ref(), &constraints).await {
            Ok(stream) => stream,
            Err(AcquisitionError::PermissionDenied) => {
                self.route_to_permission_overlay();
                return Ok(ViewerPhase::AwaitingPermission);
            }
            Err(AcquisitionError::RequestPending) => {
                debug!("Permission request already pending");
                return Ok(self.phase());
            }
            Err(e) => return Err(self.setup_failed("Camera could not be started", e.into()).await),
        };

        self.status.set_permission_overlay(false);
        self.status.set_notice(None);
        let session = self.devices.adopt(stream).await;

        if let Err(e) = self.finish_setup(&session).await {
            return Err(self.setup_failed("Viewer setup failed", e).await);
        }

        self.status.hide_loader();
        *self.phase.write() = ViewerPhase::Running;
        info!("Viewer running");
        Ok(ViewerPhase::Running)
    }

    async fn finish_setup(&self, session: &StreamSession) -> Result<(), ViewerError> {
        let cameras = self.devices.list_cameras().await?;
        info!("Found {} cameras", cameras.len());
        {
            let mut controls = self.controls.write();
            controls.set_cameras(cameras);
            controls.set_selected_camera(session.device_id());
            controls.set_flipped(self.devices.is_flipped());
        }

        let detectors = self.ready_detectors()?;
        if detectors.active().is_none() {
            let parameters = self.controls.read().requested_parameters();
            self.status
                .show_full_page(format!("Loading model {}", self.model_label(&parameters.model_identifier)));
            detectors.rebuild(parameters, &self.status.progress_observer()).await?;
        }
        Ok(())
    }

    async fn apply_if_running(&self, running: bool) -> Result<EventOutcome, ViewerError> {
        if !running {
            return Ok(EventOutcome::Deferred);
        }
        self.apply_parameters().await.map(EventOutcome::Rebuilt)
    }

    async fn apply_parameters(&self) -> Result<RebuildOutcome, ViewerError> {
        let detectors = self.ready_detectors()?;
        let parameters = self.controls.read().requested_parameters();
        if detectors.last_applied().as_ref() == Some(&parameters) {
            return Ok(detectors.supersede_pending());
        }

        self.pending_rebuilds.fetch_add(1, Ordering::SeqCst);
        self.status.set_notice(None);
        self.status
            .show_overlay(format!("Loading model {}", self.model_label(&parameters.model_identifier)));

        let result = detectors
            .rebuild_if_changed(parameters, &self.status.progress_observer())
            .await;

        if self.pending_rebuilds.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.status.hide_loader();
        }
        if let Err(e) = &result {
            warn!("Model update failed, keeping previous detector: {}", e);
            self.status.set_notice(Some(e.to_string()));
        }
        result
    }

    async fn switch_camera(&self, device_id: Option<&str>) -> Result<EventOutcome, ViewerError> {
        match self.devices.switch_to(device_id).await {
            Ok(session) => {
                self.status.set_notice(None);
                let mut controls = self.controls.write();
                controls.set_selected_camera(session.device_id());
                controls.set_flipped(self.devices.is_flipped());
                Ok(EventOutcome::CameraSwitched(session.device_id().map(str::to_string)))
            }
            Err(AcquisitionError::PermissionDenied) => {
                self.sync_selected_camera();
                self.permission.mark_denied();
                self.route_to_permission_overlay();
                Ok(EventOutcome::AwaitingPermission)
            }
            Err(e) => {
                self.sync_selected_camera();
                self.status.set_notice(Some(e.user_message()));
                Err(e.into())
            }
        }
    }

    // The previous stream is stopped before acquiring, so a failed switch
    // can leave no camera bound.
    fn sync_selected_camera(&self) {
        let bound = self.devices.current();
        self.controls
            .write()
            .set_selected_camera(bound.as_ref().and_then(|s| s.device_id()));
    }

    fn route_to_permission_overlay(&self) {
        info!("Camera permission denied, showing permission overlay");
        self.status.hide_loader();
        self.status.set_permission_overlay(true);
        *self.phase.write() = ViewerPhase::AwaitingPermission;
    }

    /// Setup failed. Fatal the first time; once a detector has been published
    /// (a retry after a mid-session denial) the viewer keeps waiting for
    /// another retry instead.
    async fn setup_failed(&self, title: &str, err: ViewerError) -> ViewerError {
        let has_detector = self.detectors.get().is_some_and(|d| d.active().is_some());
        if !has_detector {
            return self.fail_setup(title, err);
        }

        warn!("{}, awaiting another retry: {}", title, err);
        self.devices.release().await;
        let message = match &err {
            ViewerError::DeviceAcquisition(e) => e.user_message(),
            other => other.to_string(),
        };
        self.status.hide_loader();
        self.status.set_notice(Some(message));
        self.status.set_permission_overlay(true);
        *self.phase.write() = ViewerPhase::AwaitingPermission;
        err
    }

    fn fail_setup(&self, title: &str, err: ViewerError) -> ViewerError {
        let details = match &err {
            ViewerError::DeviceAcquisition(e) => format!("{} ({})", e.user_message(), e),
            other => other.to_string(),
        };
        error!("{}: {}", title, details);
        self.status.set_fatal(title, details);
        *self.phase.write() = ViewerPhase::Failed;
        err
    }

    fn ready_detectors(&self) -> Result<&Arc<DetectorManager>, ViewerError> {
        self.detectors
            .get()
            .ok_or_else(|| ViewerError::NotReady("detection runtime not loaded".to_string()))
    }

    fn model_label(&self, model_identifier: &str) -> String {
        self.config
            .find_model(model_identifier)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| model_identifier.to_string())
    }
}
