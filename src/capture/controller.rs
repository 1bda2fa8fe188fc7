use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    audio::{Cue, CuePlayer},
    camera::{MediaConstraints, MediaDevices, VideoStream},
    error::{AppError, Result},
    models::{CapturedPhoto, TimerSetting},
};

use super::{
    analytics::TimerUsageSummary,
    events::{CountdownTick, PhotosUpdated, SessionEvent},
    frame::{self, EncodedFrame},
    state::{CaptureStatus, SessionSnapshot, SessionState, Transition},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// How long a fresh photo stays on screen before the next pose is shown.
pub const POSE_ADVANCE_DELAY: Duration = Duration::from_millis(1500);
const EVENT_CAPACITY: usize = 64;

struct CountdownTicker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl CountdownTicker {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Owns the guided capture session: the live stream, the single countdown
/// task and the photo slots.
///
/// Lock order is `state` → `ticker` → `pending_advance`. `stream` is never
/// acquired while `state` is held.
#[derive(Clone)]
pub struct CaptureController {
    state: Arc<Mutex<SessionState>>,
    stream: Arc<Mutex<Option<Box<dyn VideoStream>>>>,
    ticker: Arc<Mutex<Option<CountdownTicker>>>,
    pending_advance: Arc<Mutex<Option<JoinHandle<()>>>>,
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    cues: Arc<dyn CuePlayer>,
    cues_enabled: Arc<AtomicBool>,
    /// Timer seconds a fresh session starts with.
    default_timer: Arc<AtomicU8>,
    events: broadcast::Sender<SessionEvent>,
    tick_interval: Duration,
    advance_delay: Duration,
}

impl CaptureController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        cues: Arc<dyn CuePlayer>,
        default_timer: TimerSetting,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SessionState::new(default_timer))),
            stream: Arc::new(Mutex::new(None)),
            ticker: Arc::new(Mutex::new(None)),
            pending_advance: Arc::new(Mutex::new(None)),
            devices,
            constraints: MediaConstraints::default(),
            cues,
            cues_enabled: Arc::new(AtomicBool::new(true)),
            default_timer: Arc::new(AtomicU8::new(default_timer.seconds())),
            events,
            tick_interval: Duration::from_secs(1),
            advance_delay: POSE_ADVANCE_DELAY,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn set_audio_cues(&self, enabled: bool) {
        self.cues_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Used by the next `reset_session`; the running session keeps its
    /// selected timer.
    pub fn set_default_timer(&self, timer: TimerSetting) {
        self.default_timer.store(timer.seconds(), Ordering::SeqCst);
    }

    fn default_timer(&self) -> TimerSetting {
        TimerSetting::try_from(self.default_timer.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.state.lock().await)
    }

    /// Everything a submission needs, read under one lock so a concurrent
    /// retake cannot split it.
    pub async fn submission_snapshot(&self) -> SubmissionSnapshot {
        let state = self.state.lock().await;
        SubmissionSnapshot {
            session_id: state.session_id.clone(),
            summary: state.timer_usage_summary(Utc::now()),
            complete_photos: state
                .has_all_photos()
                .then(|| state.captured_photos().cloned().collect()),
        }
    }

    pub async fn has_active_timer(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.handle.is_finished())
    }

    pub async fn is_streaming(&self) -> bool {
        self.stream
            .lock()
            .await
            .as_ref()
            .is_some_and(|stream| stream.is_live())
    }

    pub async fn open_camera(&self) -> Result<SessionSnapshot> {
        let mut stream_slot = self.stream.lock().await;
        if stream_slot.as_ref().is_some_and(|stream| stream.is_live()) {
            return Ok(self.snapshot().await);
        }

        let devices = Arc::clone(&self.devices);
        let constraints = self.constraints.clone();
        let acquired = tokio::task::spawn_blocking(move || devices.get_user_media(&constraints))
            .await
            .map_err(|e| AppError::MediaAccessOther(format!("camera worker failed: {e}")))?;

        let stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                log_warn!("Camera acquisition failed ({}): {}", err.kind(), err);
                return Err(err);
            }
        };

        log_info!(
            "Camera opened at {}x{}",
            stream.settings().width,
            stream.settings().height
        );
        let stale = stream_slot.replace(stream);
        drop(stream_slot);
        if let Some(stale) = stale {
            stop_stream(stale).await;
        }

        let mut state = self.state.lock().await;
        state.camera_opened();
        self.notify(&state);
        Ok(SessionSnapshot::from(&*state))
    }

    pub async fn select_timer(&self, timer: TimerSetting) -> Result<SessionSnapshot> {
        let mut state = self.state.lock().await;
        state.select_timer(timer)?;
        self.notify(&state);
        Ok(SessionSnapshot::from(&*state))
    }

    pub async fn start_countdown(&self) -> Result<SessionSnapshot> {
        let mut state = self.state.lock().await;
        if state.begin_countdown()? == Transition::Ignored {
            return Ok(SessionSnapshot::from(&*state));
        }

        {
            let mut ticker = self.ticker.lock().await;
            if let Some(stale) = ticker.take() {
                log_warn!("Replacing a countdown task that outlived its countdown");
                stale.stop();
            }
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(self.clone().run_countdown(cancel.clone()));
            *ticker = Some(CountdownTicker { handle, cancel });
        }

        log_info!(
            "Countdown started: {} for pose '{}'",
            state.selected_timer,
            state.current_pose().name
        );
        self.publish(SessionEvent::CountdownTick(CountdownTick {
            remaining: state.countdown_remaining,
            pose_index: state.current_pose_index,
            cue: None,
        }));
        self.notify(&state);
        Ok(SessionSnapshot::from(&*state))
    }

    pub async fn cancel_countdown(&self) -> SessionSnapshot {
        let mut state = self.state.lock().await;
        if state.cancel_countdown() == Transition::Applied {
            self.stop_ticker().await;
            log_info!(
                "Countdown cancelled ({} cancellations this session)",
                state.timer_cancellation_count
            );
            self.notify(&state);
        }
        SessionSnapshot::from(&*state)
    }

    pub async fn retake(&self) -> Result<SessionSnapshot> {
        let mut state = self.state.lock().await;
        state.retake()?;
        self.abort_pending_advance().await;
        log_info!("Retaking pose '{}'", state.current_pose().name);
        self.notify(&state);
        Ok(SessionSnapshot::from(&*state))
    }

    /// Valid from any state. Keeps photos and counters so the session can be
    /// resumed by reopening the camera.
    pub async fn close_camera(&self) -> SessionSnapshot {
        self.shut_camera().await;

        let state = self.state.lock().await;
        self.notify(&state);
        SessionSnapshot::from(&*state)
    }

    /// Close the camera and start over with empty slots and counters, using
    /// the configured default timer.
    pub async fn reset_session(&self) -> SessionSnapshot {
        self.shut_camera().await;

        let mut state = self.state.lock().await;
        *state = SessionState::new(self.default_timer());
        log_info!("Capture session reset ({})", state.session_id);
        self.notify(&state);
        SessionSnapshot::from(&*state)
    }

    /// Stop the countdown and pending advance, then release the stream.
    /// Publishes nothing.
    async fn shut_camera(&self) {
        {
            let mut state = self.state.lock().await;
            if state.camera_closed() {
                log_info!("Countdown interrupted by camera close");
            }
            self.stop_ticker().await;
            self.abort_pending_advance().await;
        }

        self.release_stream().await;
    }

    async fn run_countdown(self, cancel: CancellationToken) {
        let mut interval = time::interval_at(
            time::Instant::now() + self.tick_interval,
            self.tick_interval,
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut state = self.state.lock().await;
            if cancel.is_cancelled() || state.status != CaptureStatus::CountingDown {
                break;
            }

            let remaining = state.tick();
            log_debug!("Countdown tick: {remaining}s left");
            let cue = match remaining {
                0 => Some(Cue::Shutter),
                1..=3 => Some(Cue::Tick),
                _ => None,
            };
            if let Some(cue) = cue {
                if self.cues_enabled.load(Ordering::SeqCst) {
                    self.cues.play(cue);
                }
            }
            self.publish(SessionEvent::CountdownTick(CountdownTick {
                remaining,
                pose_index: state.current_pose_index,
                cue,
            }));

            if remaining > 0 {
                continue;
            }

            if let Err(err) = state.begin_capture() {
                log_error!("Countdown finished in an unexpected state: {err}");
                break;
            }
            // Timer is done; what follows is the capture, not the countdown.
            self.ticker.lock().await.take();
            self.notify(&state);
            drop(state);

            self.run_capture().await;
            break;
        }
    }

    async fn run_capture(&self) {
        let outcome = self.capture_frame().await;

        let mut state = self.state.lock().await;
        if state.status != CaptureStatus::Capturing {
            log_info!("Dropping capture result; session is now {:?}", state.status);
            return;
        }

        match outcome {
            Ok(encoded) => {
                let pose = state.current_pose();
                let timer = state.countdown_timer.unwrap_or(state.selected_timer);
                let photo = CapturedPhoto {
                    pose_name: pose.name.to_string(),
                    preview_data_uri: frame::preview_data_uri(&encoded.jpeg),
                    jpeg: encoded.jpeg,
                    captured_at: Utc::now(),
                    timer_seconds_used: timer.seconds(),
                    quality: encoded.quality,
                };
                let bytes = photo.jpeg.len();
                let replaced = state.store_photo(photo);
                log_info!(
                    "Captured '{}' ({} bytes, {} timer{})",
                    pose.name,
                    bytes,
                    timer,
                    if replaced { ", replaced" } else { "" }
                );
                self.schedule_advance().await;
                self.notify(&state);
            }
            Err(err) => {
                state.capture_failed();
                log_warn!("Capture for '{}' failed: {}", state.current_pose().name, err);
                self.publish(SessionEvent::CaptureError(err));
                self.notify(&state);
            }
        }
    }

    async fn capture_frame(&self) -> Result<EncodedFrame> {
        let receiver = {
            let guard = self.stream.lock().await;
            match guard.as_ref() {
                Some(stream) if stream.is_live() => stream.request_frame(),
                _ => {
                    return Err(AppError::CaptureValidationFailed(
                        "camera stream is not active".into(),
                    ))
                }
            }
        };

        let raw = frame::await_frame(receiver).await?;
        tokio::task::spawn_blocking(move || frame::process_frame(&raw))
            .await
            .map_err(|e| AppError::CaptureValidationFailed(format!("frame worker failed: {e}")))?
    }

    async fn schedule_advance(&self) {
        let mut slot = self.pending_advance.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let controller = self.clone();
        *slot = Some(tokio::spawn(async move {
            time::sleep(controller.advance_delay).await;
            let mut state = controller.state.lock().await;
            if state.finish_pose_advance() == Transition::Applied {
                if state.status == CaptureStatus::Complete {
                    log_info!("All poses captured for session {}", state.session_id);
                }
                controller.notify(&state);
            }
        }));
    }

    async fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.stop();
        }
    }

    async fn abort_pending_advance(&self) {
        if let Some(handle) = self.pending_advance.lock().await.take() {
            handle.abort();
        }
    }

    async fn release_stream(&self) {
        let taken = self.stream.lock().await.take();
        if let Some(stream) = taken {
            stop_stream(stream).await;
            log_info!("Camera stream released");
        }
    }

    fn notify(&self, state: &SessionState) {
        self.publish(SessionEvent::PhotosUpdated(PhotosUpdated {
            count: state.photo_count(),
            all_complete: state.has_all_photos(),
            current_pose_index: state.current_pose_index,
            status: state.status,
            summary: state.timer_usage_summary(Utc::now()),
        }));
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the shell may not be listening yet.
        let _ = self.events.send(event);
    }
}

/// Device teardown can block on the capture thread, so it runs on the
/// blocking pool with no lock held.
async fn stop_stream(mut stream: Box<dyn VideoStream>) {
    if let Err(err) = tokio::task::spawn_blocking(move || stream.stop_tracks()).await {
        log_error!("Camera release worker failed: {err}");
    }
}

/// Session data read atomically for a submission. `complete_photos` is set
/// only when every pose has a photo.
#[derive(Clone)]
pub struct SubmissionSnapshot {
    pub session_id: String,
    pub summary: TimerUsageSummary,
    pub complete_photos: Option<Vec<CapturedPhoto>>,
}
