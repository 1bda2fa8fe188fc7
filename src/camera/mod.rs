pub mod webcam;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::AppError;

pub use webcam::WebcamDevices;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    User,
    Environment,
}

/// What the session asks the platform for. Dimensions are ideals, not
/// requirements: backends pick the closest format they support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            ideal_width: 1280,
            ideal_height: 720,
            audio: false,
        }
    }
}

/// Negotiated stream parameters, i.e. the native frame size.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub device_label: String,
}

pub type FrameReceiver = oneshot::Receiver<anyhow::Result<RgbImage>>;

/// A live video stream with a single owner.
pub trait VideoStream: Send {
    fn settings(&self) -> &StreamSettings;

    /// Ask for the most recent frame at native resolution.
    fn request_frame(&self) -> FrameReceiver;

    /// Stop every track and release the device. Idempotent.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

pub trait MediaDevices: Send + Sync {
    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn VideoStream>, AppError>;
}

/// Map a backend failure message onto the three acquisition error kinds.
pub fn classify_media_error(message: &str) -> AppError {
    let lowered = message.to_ascii_lowercase();
    if ["permission", "denied", "not authorized", "notallowed"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        AppError::MediaAccessDenied(message.to_string())
    } else if ["not found", "no device", "could not find", "no camera", "notfound"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        AppError::MediaDeviceNotFound(message.to_string())
    } else {
        AppError::MediaAccessOther(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_constraints_request_front_camera_at_720p() {
        let constraints = MediaConstraints::default();
        assert_eq!(constraints.facing_mode, FacingMode::User);
        assert_eq!((constraints.ideal_width, constraints.ideal_height), (1280, 720));
        assert!(!constraints.audio);
    }

    #[test]
    fn classifies_backend_messages() {
        assert!(matches!(
            classify_media_error("Permission denied by user"),
            AppError::MediaAccessDenied(_)
        ));
        assert!(matches!(
            classify_media_error("Could not find device at index 2"),
            AppError::MediaDeviceNotFound(_)
        ));
        assert!(matches!(
            classify_media_error("Device or resource busy"),
            AppError::MediaAccessOther(_)
        ));
    }
}
