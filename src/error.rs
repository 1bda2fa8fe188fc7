//! Error kinds surfaced to the webview.
//!
//! Every variant is recoverable: the caller shows the message and the
//! component falls back to its nearest stable state.

use serde::{ser::SerializeStruct, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// The user (or the OS) refused camera access.
    #[error("Camera access was denied: {0}")]
    MediaAccessDenied(String),

    /// No capture device matched the requested constraints.
    #[error("No camera was found: {0}")]
    MediaDeviceNotFound(String),

    /// Any other acquisition failure (device busy, driver error, ...).
    #[error("Unable to access the camera: {0}")]
    MediaAccessOther(String),

    /// Blank/corrupt frame or an implausibly small encoded image.
    #[error("Photo capture failed: {0}")]
    CaptureValidationFailed(String),

    #[error("Network error while submitting: {0}")]
    SubmissionNetworkError(String),

    /// Non-2xx response, or a 2xx response with `success: false`.
    #[error("Server rejected the submission ({status}): {message}")]
    SubmissionServerError { status: u16, message: String },

    #[error("Failed to load 3D model: {0}")]
    ViewerLoadError(String),

    #[error("3D rendering context failed: {0}")]
    ViewerRenderContext(String),

    /// The requested operation is not valid in the current state.
    #[error("{0}")]
    InvalidState(String),

    /// Form input outside its accepted range.
    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MediaAccessDenied(_) => "mediaAccessDenied",
            AppError::MediaDeviceNotFound(_) => "mediaDeviceNotFound",
            AppError::MediaAccessOther(_) => "mediaAccessOther",
            AppError::CaptureValidationFailed(_) => "captureValidationFailed",
            AppError::SubmissionNetworkError(_) => "submissionNetworkError",
            AppError::SubmissionServerError { .. } => "submissionServerError",
            AppError::ViewerLoadError(_) => "viewerLoadError",
            AppError::ViewerRenderContext(_) => "viewerRenderContext",
            AppError::InvalidState(_) => "invalidState",
            AppError::InvalidInput(_) => "invalidInput",
        }
    }
}

// Commands hand errors straight to the webview, which switches on `kind`.
impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
