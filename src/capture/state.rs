use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{CapturedPhoto, TimerSetting},
    poses::{Pose, LAST_POSE_INDEX, POSE_COUNT, POSES},
};

use super::analytics::{self, TimerUsageSummary};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStatus {
    /// Camera closed.
    Idle,
    /// Camera open, waiting for the user to start a countdown.
    AwaitingCapture,
    CountingDown,
    Capturing,
    /// Photo taken; showing it briefly before moving on.
    PoseAdvance,
    /// All four poses filled.
    Complete,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        CaptureStatus::Idle
    }
}

/// Outcome of an operation that is a no-op in some states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub status: CaptureStatus,
    pub current_pose_index: usize,
    pub photos: [Option<CapturedPhoto>; POSE_COUNT],
    pub timer_active: bool,
    pub is_capturing: bool,
    pub countdown_remaining: u8,
    pub selected_timer: TimerSetting,
    /// Timer length of the countdown in flight; stamped onto the photo.
    pub countdown_timer: Option<TimerSetting>,
    pub retake_count: u32,
    pub timer_cancellation_count: u32,
    pub session_started_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(TimerSetting::default())
    }
}

impl SessionState {
    pub fn new(selected_timer: TimerSetting) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            status: CaptureStatus::Idle,
            current_pose_index: 0,
            photos: Default::default(),
            timer_active: false,
            is_capturing: false,
            countdown_remaining: 0,
            selected_timer,
            countdown_timer: None,
            retake_count: 0,
            timer_cancellation_count: 0,
            session_started_at: Utc::now(),
        }
    }

    pub fn photo_count(&self) -> usize {
        self.photos.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn has_all_photos(&self) -> bool {
        self.photo_count() == POSE_COUNT
    }

    pub fn current_pose(&self) -> &'static Pose {
        // current_pose_index never leaves the catalog bounds.
        &POSES[self.current_pose_index.min(LAST_POSE_INDEX)]
    }

    pub fn photo_at(&self, index: usize) -> Option<&CapturedPhoto> {
        self.photos.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn captured_photos(&self) -> impl Iterator<Item = &CapturedPhoto> {
        self.photos.iter().flatten()
    }

    pub fn timer_usage_summary(&self, now: DateTime<Utc>) -> TimerUsageSummary {
        let timers = analytics::timers_used(self.captured_photos());
        TimerUsageSummary {
            average_timer: analytics::average_timer(&timers),
            timer_distribution: analytics::timer_distribution(&timers),
            timer_consistency: analytics::timer_consistency(&timers),
            timers_used: timers,
            retake_count: self.retake_count,
            timer_cancellation_count: self.timer_cancellation_count,
            total_session_ms: analytics::elapsed_ms(self.session_started_at, now),
        }
    }

    pub fn camera_opened(&mut self) {
        if self.photo_count() == 0 {
            self.current_pose_index = 0;
        }
        self.status = if self.has_all_photos() {
            CaptureStatus::Complete
        } else {
            CaptureStatus::AwaitingCapture
        };
    }

    pub fn select_timer(&mut self, timer: TimerSetting) -> Result<()> {
        if self.timer_active {
            return Err(AppError::InvalidState(
                "cannot change the timer while a countdown is running".into(),
            ));
        }
        self.selected_timer = timer;
        Ok(())
    }

    pub fn begin_countdown(&mut self) -> Result<Transition> {
        match self.status {
            CaptureStatus::AwaitingCapture => {
                self.status = CaptureStatus::CountingDown;
                self.timer_active = true;
                self.countdown_timer = Some(self.selected_timer);
                self.countdown_remaining = self.selected_timer.seconds();
                Ok(Transition::Applied)
            }
            CaptureStatus::CountingDown | CaptureStatus::Capturing | CaptureStatus::PoseAdvance => {
                Ok(Transition::Ignored)
            }
            CaptureStatus::Idle => Err(AppError::InvalidState(
                "open the camera before starting a countdown".into(),
            )),
            CaptureStatus::Complete => Err(AppError::InvalidState(
                "all poses are captured; retake a pose to capture again".into(),
            )),
        }
    }

    /// One elapsed second. Returns the remaining count.
    pub fn tick(&mut self) -> u8 {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        self.countdown_remaining
    }

    pub fn cancel_countdown(&mut self) -> Transition {
        if self.status != CaptureStatus::CountingDown {
            return Transition::Ignored;
        }
        self.clear_timer();
        self.countdown_timer = None;
        self.timer_cancellation_count += 1;
        self.status = CaptureStatus::AwaitingCapture;
        Transition::Applied
    }

    /// Countdown hit zero: the timer is cleared before capture begins.
    pub fn begin_capture(&mut self) -> Result<()> {
        if self.status != CaptureStatus::CountingDown || self.is_capturing {
            return Err(AppError::InvalidState("a capture is already in flight".into()));
        }
        self.clear_timer();
        self.is_capturing = true;
        self.status = CaptureStatus::Capturing;
        Ok(())
    }

    /// Store the new photo in the current slot. Returns true when it replaced
    /// an existing photo.
    pub fn store_photo(&mut self, photo: CapturedPhoto) -> bool {
        let replaced = self.photos[self.current_pose_index].replace(photo).is_some();
        self.is_capturing = false;
        self.countdown_timer = None;
        self.status = CaptureStatus::PoseAdvance;
        replaced
    }

    pub fn capture_failed(&mut self) {
        self.is_capturing = false;
        self.countdown_timer = None;
        if self.status == CaptureStatus::Capturing {
            self.status = CaptureStatus::AwaitingCapture;
        }
    }

    /// End of the display pause after a successful capture.
    pub fn finish_pose_advance(&mut self) -> Transition {
        if self.status != CaptureStatus::PoseAdvance {
            return Transition::Ignored;
        }
        if self.current_pose_index < LAST_POSE_INDEX {
            self.current_pose_index += 1;
        }
        self.status = if self.has_all_photos() {
            CaptureStatus::Complete
        } else {
            CaptureStatus::AwaitingCapture
        };
        Transition::Applied
    }

    pub fn retake(&mut self) -> Result<()> {
        if matches!(
            self.status,
            CaptureStatus::CountingDown | CaptureStatus::Capturing
        ) {
            return Err(AppError::InvalidState(
                "cannot retake while a capture is in progress".into(),
            ));
        }
        if self.status == CaptureStatus::Idle {
            return Err(AppError::InvalidState(
                "open the camera before retaking a photo".into(),
            ));
        }
        if self.photos[self.current_pose_index].take().is_none() {
            let pose = self.current_pose().name;
            return Err(AppError::InvalidState(format!(
                "no {pose} photo to retake"
            )));
        }
        self.retake_count += 1;
        self.status = CaptureStatus::AwaitingCapture;
        Ok(())
    }

    /// Camera went away. Returns true when an active countdown was cut short.
    pub fn camera_closed(&mut self) -> bool {
        let cancelled = self.cancel_countdown() == Transition::Applied;
        self.finish_pose_advance();
        self.is_capturing = false;
        self.countdown_timer = None;
        self.status = CaptureStatus::Idle;
        cancelled
    }

    fn clear_timer(&mut self) {
        self.timer_active = false;
        self.countdown_remaining = 0;
    }
}

/// What the webview renders for the capture panel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: CaptureStatus,
    pub current_pose_index: usize,
    pub current_pose: Pose,
    pub photos: Vec<Option<CapturedPhoto>>,
    pub photo_count: usize,
    pub all_complete: bool,
    pub timer_active: bool,
    pub is_capturing: bool,
    pub countdown_remaining: u8,
    pub selected_timer: TimerSetting,
    pub summary: TimerUsageSummary,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            status: state.status,
            current_pose_index: state.current_pose_index,
            current_pose: *state.current_pose(),
            photos: (0..POSE_COUNT).map(|i| state.photo_at(i).cloned()).collect(),
            photo_count: state.photo_count(),
            all_complete: state.has_all_photos(),
            timer_active: state.timer_active,
            is_capturing: state.is_capturing,
            countdown_remaining: state.countdown_remaining,
            selected_timer: state.selected_timer,
            summary: state.timer_usage_summary(Utc::now()),
        }
    }
}
