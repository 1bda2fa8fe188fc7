use std::{path::Path, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

use super::{
    asset::{self, SceneAsset, SceneInfo},
    orbit::{CameraPose, OrbitControls, ViewerInput},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// ~60 Hz.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const EVENT_CAPACITY: usize = 16;

/// One camera update for the renderer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFrame {
    #[serde(flatten)]
    pub camera: CameraPose,
    pub frame_number: u64,
}

/// Where frames go. The shell forwards them to the webview canvas.
pub trait FrameSink: Send + Sync {
    fn present(&self, frame: &ViewerFrame) -> std::result::Result<(), String>;
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewerErrorKind {
    Load,
    RenderContext,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewerError {
    pub kind: ViewerErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Ready(SceneInfo),
    Error(ViewerError),
}

impl ViewerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ViewerEvent::Ready(_) => "viewer-ready",
            ViewerEvent::Error(_) => "viewer-error",
        }
    }
}

struct FrameLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl FrameLoop {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[derive(Default)]
struct ViewerInner {
    scene: Option<SceneAsset>,
    controls: OrbitControls,
    dirty: bool,
    frame_loop: Option<FrameLoop>,
    frame_number: u64,
    /// Bumped by every load and teardown so a slow parse can't install a
    /// scene that was superseded meanwhile.
    generation: u64,
}

/// Interactive 3D mannequin: scene resources, orbit state and the frame
/// loop that feeds a [`FrameSink`].
#[derive(Clone)]
pub struct MannequinViewer {
    inner: Arc<Mutex<ViewerInner>>,
    sink: Arc<dyn FrameSink>,
    events: broadcast::Sender<ViewerEvent>,
    frame_interval: Duration,
}

impl MannequinViewer {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(ViewerInner::default())),
            sink,
            events,
            frame_interval: FRAME_INTERVAL,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.events.subscribe()
    }

    pub async fn load(&self, path: &Path) -> Result<SceneInfo> {
        let generation = self.next_generation().await;
        let loaded = asset::load_glb(path).await;
        self.install(generation, loaded).await
    }

    pub async fn load_bytes(&self, bytes: Vec<u8>) -> Result<SceneInfo> {
        let generation = self.next_generation().await;
        let loaded = asset::parse_glb(bytes).await;
        self.install(generation, loaded).await
    }

    /// Apply canvas input to the orbit camera and return the resulting view.
    pub async fn handle_input(&self, input: &ViewerInput) -> CameraPose {
        let mut inner = self.inner.lock().await;
        if inner.controls.apply(input) {
            inner.dirty = true;
        }
        inner.controls.pose()
    }

    pub async fn camera(&self) -> CameraPose {
        self.inner.lock().await.controls.pose()
    }

    pub async fn scene_info(&self) -> Option<SceneInfo> {
        self.inner.lock().await.scene.as_ref().map(SceneAsset::info)
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .lock()
            .await
            .frame_loop
            .as_ref()
            .is_some_and(|frame_loop| !frame_loop.handle.is_finished())
    }

    /// Stop the frame loop and release the scene. Safe to call repeatedly;
    /// returns whether anything was released.
    pub async fn teardown(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        let had_loop = match inner.frame_loop.take() {
            Some(frame_loop) => {
                frame_loop.stop();
                true
            }
            None => false,
        };
        let had_scene = inner.scene.take().is_some();
        inner.controls = OrbitControls::default();
        inner.dirty = false;

        if had_loop || had_scene {
            log_info!("Viewer torn down");
        }
        had_loop || had_scene
    }

    async fn next_generation(&self) -> u64 {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.generation
    }

    async fn install(&self, generation: u64, loaded: Result<SceneAsset>) -> Result<SceneInfo> {
        let scene = match loaded {
            Ok(scene) => scene,
            Err(err) => {
                log_warn!("Mannequin failed to load: {err}");
                self.publish_error(ViewerErrorKind::Load, &err);
                return Err(err);
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return Err(AppError::ViewerLoadError(
                "load was superseded before it finished".into(),
            ));
        }

        let info = scene.info();
        if let Some(previous) = inner.frame_loop.take() {
            previous.stop();
        }
        inner.scene = Some(scene);
        inner.controls = OrbitControls::default();
        inner.dirty = true;
        inner.frame_number = 0;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_frame_loop(cancel.clone()));
        inner.frame_loop = Some(FrameLoop { handle, cancel });

        log_info!(
            "Mannequin ready: {} vertices, {} triangles",
            info.vertex_count,
            info.triangle_count
        );
        let _ = self.events.send(ViewerEvent::Ready(info.clone()));
        Ok(info)
    }

    async fn run_frame_loop(self, cancel: CancellationToken) {
        let mut interval = time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let frame = {
                let mut inner = self.inner.lock().await;
                if cancel.is_cancelled() || inner.scene.is_none() {
                    break;
                }
                if !inner.dirty {
                    continue;
                }
                inner.dirty = false;
                inner.frame_number += 1;
                ViewerFrame {
                    camera: inner.controls.pose(),
                    frame_number: inner.frame_number,
                }
            };

            if let Err(message) = self.sink.present(&frame) {
                log_error!("Render context lost: {message}");
                let mut inner = self.inner.lock().await;
                if !cancel.is_cancelled() {
                    // Our own handle; dropping it detaches, we exit below.
                    inner.frame_loop.take();
                }
                drop(inner);
                self.publish_error(
                    ViewerErrorKind::RenderContext,
                    &AppError::ViewerRenderContext(message),
                );
                break;
            }
        }
    }

    fn publish_error(&self, kind: ViewerErrorKind, err: &AppError) {
        let _ = self.events.send(ViewerEvent::Error(ViewerError {
            kind,
            message: err.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::asset::tests::triangle_glb;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex as StdMutex,
    };

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<ViewerFrame>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    impl FrameSink for RecordingSink {
        fn present(&self, frame: &ViewerFrame) -> std::result::Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("webgl context lost".into());
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    fn viewer() -> (MannequinViewer, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (MannequinViewer::new(sink.clone()), sink)
    }

    async fn settle() {
        time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn load_publishes_ready_and_presents_once() {
        let (viewer, sink) = viewer();
        let mut events = viewer.subscribe();

        let info = viewer.load_bytes(triangle_glb()).await.unwrap();
        assert_eq!(info.triangle_count, 1);
        assert_eq!(events.recv().await.unwrap(), ViewerEvent::Ready(info));

        settle().await;
        assert_eq!(sink.count(), 1);
        assert!(viewer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn input_redraws_only_when_view_changes() {
        let (viewer, sink) = viewer();
        viewer.load_bytes(triangle_glb()).await.unwrap();
        settle().await;

        viewer.handle_input(&ViewerInput::PointerMove { x: 5.0, y: 5.0 }).await;
        settle().await;
        assert_eq!(sink.count(), 1);

        let pose = viewer.handle_input(&ViewerInput::Wheel { delta_y: 200.0 }).await;
        settle().await;
        assert_eq!(sink.count(), 2);
        let last = sink.frames.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.camera, pose);
        assert_eq!(last.frame_number, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_asset_emits_load_error() {
        let (viewer, _sink) = viewer();
        let mut events = viewer.subscribe();

        let err = viewer.load_bytes(b"nope".to_vec()).await.unwrap_err();
        assert!(matches!(err, AppError::ViewerLoadError(_)));
        match events.recv().await.unwrap() {
            ViewerEvent::Error(e) => assert_eq!(e.kind, ViewerErrorKind::Load),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!viewer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_stops_loop_with_render_context_error() {
        let (viewer, sink) = viewer();
        sink.fail.store(true, Ordering::SeqCst);
        let mut events = viewer.subscribe();

        viewer.load_bytes(triangle_glb()).await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), ViewerEvent::Ready(_)));
        match events.recv().await.unwrap() {
            ViewerEvent::Error(e) => assert_eq!(e.kind, ViewerErrorKind::RenderContext),
            other => panic!("unexpected event {other:?}"),
        }
        settle().await;
        assert!(!viewer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_idempotent_and_stops_frames() {
        let (viewer, sink) = viewer();
        viewer.load_bytes(triangle_glb()).await.unwrap();
        settle().await;

        assert!(viewer.teardown().await);
        assert!(!viewer.teardown().await);
        assert!(viewer.scene_info().await.is_none());

        viewer.handle_input(&ViewerInput::Wheel { delta_y: 300.0 }).await;
        settle().await;
        assert_eq!(sink.count(), 1);
        assert!(!viewer.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_replaces_scene_and_resets_view() {
        let (viewer, _sink) = viewer();
        viewer.load_bytes(triangle_glb()).await.unwrap();
        viewer.handle_input(&ViewerInput::Wheel { delta_y: 500.0 }).await;

        viewer.load_bytes(triangle_glb()).await.unwrap();
        assert_eq!(viewer.camera().await, OrbitControls::default().pose());
        assert!(viewer.is_running().await);
    }
}
