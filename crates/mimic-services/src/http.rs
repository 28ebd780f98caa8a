//! Shared plumbing for third-party HTTP APIs

use crate::error::ServiceError;
use anyhow::Context;
use reqwest::Response;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Human-readable message from an API error body.
///
/// Understands `{"detail": "..."}`, `{"detail": {"message": "..."}}` and
/// `{"error": {"message": "..."}}`; anything else is returned verbatim.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        let detail = match v.get("detail") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(detail) => detail
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            None => None,
        };
        detail.or_else(|| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    });

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "Unknown error".to_string(),
        None => body.trim().to_string(),
    }
}

/// Pass successful responses through; turn the rest into [`ServiceError::Api`].
pub(crate) async fn check_status(
    service: &'static str,
    response: Response,
) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::warn!(service = service, status = status.as_u16(), %message, "API request failed");
    Err(ServiceError::Api {
        service,
        status: status.as_u16(),
        message,
    })
}

/// Multipart file part read from `path`.
pub(crate) async fn file_part(path: &Path, mime: &str) -> Result<reqwest::multipart::Part, ServiceError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))
}

/// MIME type for an audio file by extension.
pub(crate) fn audio_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "audio/mpeg",
    }
}
