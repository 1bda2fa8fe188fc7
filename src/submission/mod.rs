pub mod client;
pub mod commands;
pub mod form;
pub mod handoff;
pub mod payload;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::{
    capture::CaptureController,
    error::{AppError, Result},
};

use client::AnalysisClient;
use form::MeasurementForm;
use handoff::ResultHandoff;
use payload::PhotoMetadata;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const RESULTS_ROUTE: &str = "/results";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Basic,
    Enhanced,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub analysis_type: AnalysisType,
    pub redirect_to: String,
    pub result: Value,
}

/// Validates the form, picks basic or enhanced analysis from the capture
/// session and parks the result for the results view. One submission at a
/// time.
pub struct SubmissionService {
    http: reqwest::Client,
    handoff: ResultHandoff,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SubmissionService {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            handoff: ResultHandoff::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn handoff(&self) -> &ResultHandoff {
        &self.handoff
    }

    pub async fn submit(
        &self,
        base_url: &str,
        form: &MeasurementForm,
        capture: &CaptureController,
    ) -> Result<SubmissionReceipt> {
        let measurements = form.validate()?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AppError::InvalidState(
                "A submission is already in progress".into(),
            ));
        }
        let _guard = InFlight(&self.in_flight);

        let client = AnalysisClient::new(self.http.clone(), base_url);
        let session = capture.submission_snapshot().await;
        let summary = session.summary;

        let (analysis_type, result) = if let Some(photos) = session.complete_photos {
            let metadata = PhotoMetadata::build(&session.session_id, &photos, &summary);
            let result = client
                .analyze_enhanced(&measurements, &photos, &metadata)
                .await?;
            (AnalysisType::Enhanced, result)
        } else {
            (AnalysisType::Basic, client.analyze_basic(&measurements).await?)
        };

        let result = self
            .handoff
            .store_result(result, &summary)
            .map_err(|e| AppError::InvalidState(format!("Failed to store result: {e}")))?;
        log_info!("{analysis_type:?} analysis stored; navigating to {RESULTS_ROUTE}");

        Ok(SubmissionReceipt {
            analysis_type,
            redirect_to: RESULTS_ROUTE.to_string(),
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{Cue, CuePlayer},
        camera::{MediaConstraints, MediaDevices, VideoStream},
        capture::state::tests::photo,
        models::TimerSetting,
    };
    use client::tests::{measurements, serve_once};
    use std::sync::Arc;

    struct NoCamera;

    impl MediaDevices for NoCamera {
        fn get_user_media(
            &self,
            _constraints: &MediaConstraints,
        ) -> std::result::Result<Box<dyn VideoStream>, AppError> {
            Err(AppError::MediaDeviceNotFound("test".into()))
        }
    }

    struct Silent;

    impl CuePlayer for Silent {
        fn play(&self, _cue: Cue) {}
    }

    fn capture() -> CaptureController {
        CaptureController::new(Arc::new(NoCamera), Arc::new(Silent), TimerSetting::Five)
    }

    fn form() -> MeasurementForm {
        MeasurementForm {
            height: 175.0,
            weight: 70.0,
            gender: "female".into(),
        }
    }

    #[tokio::test]
    async fn without_photos_falls_back_to_basic_and_stores_result() {
        let (base, server) = serve_once(200, r#"{"success":true,"bmi":22.9}"#).await;
        let service = SubmissionService::new(client::http_client().unwrap());

        let receipt = service.submit(&base, &form(), &capture()).await.unwrap();

        assert_eq!(receipt.analysis_type, AnalysisType::Basic);
        assert_eq!(receipt.redirect_to, "/results");
        let stored = service.handoff().result().unwrap().unwrap();
        assert_eq!(stored["bmi"], 22.9);
        assert!(stored["client_timer_analytics"].is_object());
        assert!(server.await.unwrap().starts_with("POST /api/analyze "));
    }

    #[tokio::test]
    async fn invalid_form_never_hits_the_network() {
        let service = SubmissionService::new(client::http_client().unwrap());
        let mut bad = form();
        bad.height = 90.0;

        let err = service
            .submit("http://127.0.0.1:1", &bad, &capture())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(service.handoff().result().unwrap().is_none());
    }

    #[tokio::test]
    async fn server_failure_leaves_handoff_empty() {
        let (base, _server) =
            serve_once(500, r#"{"success":false,"error":"Failed to analyze photos"}"#).await;
        let service = SubmissionService::new(client::http_client().unwrap());

        let err = service.submit(&base, &form(), &capture()).await.unwrap_err();
        assert_eq!(
            err,
            AppError::SubmissionServerError {
                status: 500,
                message: "Failed to analyze photos".into()
            }
        );
        assert!(service.handoff().result().unwrap().is_none());
    }

    #[tokio::test]
    async fn enhanced_request_is_multipart_with_all_poses() {
        let (base, server) = serve_once(200, r#"{"success":true}"#).await;
        let client = AnalysisClient::new(client::http_client().unwrap(), &base);
        let photos: Vec<_> = ["front", "left", "right", "back"]
            .into_iter()
            .map(|pose| photo(pose, 5))
            .collect();
        let summary = capture().submission_snapshot().await.summary;
        let metadata = PhotoMetadata::build("s-1", &photos, &summary);

        client
            .analyze_enhanced(&measurements(), &photos, &metadata)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/analyze-enhanced "));
        assert!(request.contains("multipart/form-data"));
        for field in [
            "name=\"analysis_type\"",
            "name=\"photo_front\"",
            "name=\"photo_back\"",
            "name=\"photo_metadata\"",
            "filename=\"left.jpg\"",
            "\"session_id\":\"s-1\"",
        ] {
            assert!(request.contains(field), "missing {field}");
        }
    }
}
