use serde::Serialize;

use crate::{audio::Cue, error::AppError};

use super::{analytics::TimerUsageSummary, state::CaptureStatus};

/// The single consolidated notification emitted after every state change.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotosUpdated {
    pub count: usize,
    pub all_complete: bool,
    pub current_pose_index: usize,
    pub status: CaptureStatus,
    pub summary: TimerUsageSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CountdownTick {
    pub remaining: u8,
    pub pose_index: usize,
    /// Audible/visual cue for this tick, if any.
    pub cue: Option<Cue>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhotosUpdated(PhotosUpdated),
    CountdownTick(CountdownTick),
    CaptureError(AppError),
}

impl SessionEvent {
    /// Name the webview listens on.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::PhotosUpdated(_) => "photos-updated",
            SessionEvent::CountdownTick(_) => "countdown-tick",
            SessionEvent::CaptureError(_) => "capture-error",
        }
    }
}
