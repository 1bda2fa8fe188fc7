use std::time::Duration;

use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::{
    error::{AppError, Result},
    models::CapturedPhoto,
};

use super::{
    form::Measurements,
    payload::{BasicRequest, PhotoMetadata},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const BASIC_ENDPOINT: &str = "/api/analyze";
pub const ENHANCED_ENDPOINT: &str = "/api/analyze-enhanced";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Talks to the avatar analysis server. Cheap to construct per request.
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn analyze_basic(&self, measurements: &Measurements) -> Result<Value> {
        log_info!("Submitting basic analysis");
        let response = self
            .http
            .post(self.url(BASIC_ENDPOINT))
            .json(&BasicRequest::from(measurements))
            .send()
            .await
            .map_err(network_error)?;
        read_response(response).await
    }

    pub async fn analyze_enhanced(
        &self,
        measurements: &Measurements,
        photos: &[CapturedPhoto],
        metadata: &PhotoMetadata,
    ) -> Result<Value> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| AppError::InvalidState(format!("photo metadata: {e}")))?;

        let mut form = Form::new()
            .text("height", measurements.height.to_string())
            .text("weight", measurements.weight.to_string())
            .text("gender", measurements.gender.as_str())
            .text("analysis_type", "enhanced");

        for photo in photos {
            let part = Part::bytes(photo.jpeg.clone())
                .file_name(photo.file_name())
                .mime_str("image/jpeg")
                .map_err(network_error)?;
            form = form.part(format!("photo_{}", photo.pose_name), part);
        }
        form = form.text("photo_metadata", metadata_json);

        log_info!("Submitting enhanced analysis with {} photos", photos.len());
        let response = self
            .http
            .post(self.url(ENHANCED_ENDPOINT))
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        read_response(response).await
    }
}

fn network_error(err: reqwest::Error) -> AppError {
    AppError::SubmissionNetworkError(err.to_string())
}

async fn read_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network_error)?;
    interpret_response(status, &body)
}

/// Non-2xx, unparseable or `success: false` bodies are server errors; the
/// server's `error` field becomes the message when present.
pub fn interpret_response(status: u16, body: &str) -> Result<Value> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let server_message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if !(200..300).contains(&status) {
        let message = server_message.unwrap_or_else(|| format!("HTTP {status}"));
        log_warn!("Analysis server returned {status}: {message}");
        return Err(AppError::SubmissionServerError { status, message });
    }

    let Some(value) = parsed else {
        return Err(AppError::SubmissionServerError {
            status,
            message: "response was not valid JSON".into(),
        });
    };

    if value.get("success").and_then(Value::as_bool) != Some(true) {
        let message = server_message.unwrap_or_else(|| "analysis failed".into());
        log_warn!("Analysis reported failure: {message}");
        return Err(AppError::SubmissionServerError { status, message });
    }

    Ok(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::submission::form::Gender;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    pub(crate) fn measurements() -> Measurements {
        Measurements {
            height: 175.0,
            weight: 70.0,
            gender: Gender::Female,
        }
    }

    /// One-shot HTTP server: answers the first request with `status` and
    /// `body`, and hands back the raw request it received.
    pub(crate) async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (base, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let body_len = data.len() - header_end - 4;
            if headers.contains("transfer-encoding: chunked") {
                if text.ends_with("0\r\n\r\n") {
                    break;
                }
            } else {
                let expected = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if body_len >= expected {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    #[test]
    fn error_field_becomes_message() {
        let err = interpret_response(400, r#"{"success":false,"error":"Missing front photo"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            AppError::SubmissionServerError {
                status: 400,
                message: "Missing front photo".into()
            }
        );
    }

    #[test]
    fn success_false_on_200_is_a_server_error() {
        let err = interpret_response(200, r#"{"success":false}"#).unwrap_err();
        assert!(matches!(err, AppError::SubmissionServerError { status: 200, .. }));
    }

    #[test]
    fn html_error_page_falls_back_to_status() {
        let err = interpret_response(502, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(
            err,
            AppError::SubmissionServerError {
                status: 502,
                message: "HTTP 502".into()
            }
        );
    }

    #[tokio::test]
    async fn basic_submission_posts_json() {
        let (base, server) = serve_once(200, r#"{"success":true,"avatar":{"id":1}}"#).await;
        let client = AnalysisClient::new(http_client().unwrap(), &format!("{base}/"));

        let value = client.analyze_basic(&measurements()).await.unwrap();
        assert_eq!(value["avatar"]["id"], 1);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/analyze HTTP/1.1"));
        assert!(request.contains(r#""gender":"female""#));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = AnalysisClient::new(http_client().unwrap(), &base);
        let err = client.analyze_basic(&measurements()).await.unwrap_err();
        assert!(matches!(err, AppError::SubmissionNetworkError(_)));
    }
}
