//! Error types module
//!
//! `AppError` is the caller-facing taxonomy shared by every Mimic component.
//! Lower layers keep their own `thiserror` enums and convert into it at the
//! service boundary.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected rejections such as validation failures
    Debug,
    /// Recoverable issues such as a saturated render queue
    Warn,
    /// Unexpected failures
    Error,
}

/// Describes how an error should be presented to a caller.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the caller
    fn suggested_action(&self) -> Option<&'static str>;

    /// Caller-facing message (may differ from the internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad input file: wrong type, wrong size, no face, too short or silent audio.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    /// Corrupt or unreadable media.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An external process (encoder, prober, detector) failed.
    #[error("External tool failure: {0}")]
    ExternalTool(String),

    /// A third-party HTTP API failed or returned a non-2xx status.
    #[error("{service} API error: {message}")]
    ExternalApi { service: String, message: String },

    #[error("Render queue is full")]
    QueueFull,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        AppError::Validation(_) => (
            "VALIDATION_ERROR",
            false,
            Some("Upload a different file that meets the requirements"),
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            LogLevel::Debug,
        ),
        AppError::Decode(_) => (
            "DECODE_ERROR",
            false,
            Some("Check the media file is not corrupt"),
            LogLevel::Warn,
        ),
        AppError::ExternalTool(_) => (
            "EXTERNAL_TOOL_FAILURE",
            true,
            Some("Verify ffmpeg is installed and retry"),
            LogLevel::Error,
        ),
        AppError::ExternalApi { .. } => (
            "EXTERNAL_API_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::QueueFull => (
            "QUEUE_FULL",
            true,
            Some("Wait for running renders to finish and retry"),
            LogLevel::Warn,
        ),
        AppError::Conflict(_) => (
            "CONFLICT",
            false,
            Some("Wait for the existing operation to finish"),
            LogLevel::Debug,
        ),
        AppError::ContentRejected(_) => (
            "CONTENT_REJECTED",
            false,
            Some("Rephrase the message"),
            LogLevel::Debug,
        ),
        AppError::Storage(_) => (
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error output
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Decode(_) => "Decode",
            AppError::ExternalTool(_) => "ExternalTool",
            AppError::ExternalApi { .. } => "ExternalApi",
            AppError::QueueFull => "QueueFull",
            AppError::Conflict(_) => "Conflict",
            AppError::ContentRejected(_) => "ContentRejected",
            AppError::Storage(_) => "Storage",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg)
            | AppError::InvalidInput(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::PayloadTooLarge(ref msg)
            | AppError::Decode(ref msg)
            | AppError::Conflict(ref msg)
            | AppError::ContentRejected(ref msg) => msg.clone(),
            AppError::ExternalTool(_) => "Media encoder failed".to_string(),
            AppError::ExternalApi { service, .. } => format!("{} request failed", service),
            AppError::QueueFull => "Render queue is full".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_metadata() {
        let err = AppError::Validation("Audio too short. Need at least 10 seconds.".to_string());
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert_eq!(
            err.client_message(),
            "Audio too short. Need at least 10 seconds."
        );
    }

    #[test]
    fn test_external_api_hides_details() {
        let err = AppError::ExternalApi {
            service: "ElevenLabs".to_string(),
            message: "401 invalid key sk-123".to_string(),
        };
        assert_eq!(err.error_code(), "EXTERNAL_API_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "ElevenLabs request failed");
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_queue_full_is_recoverable_warning() {
        let err = AppError::QueueFull;
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);
        assert_eq!(err.error_type(), "QueueFull");
    }

    #[test]
    fn test_anyhow_conversion_keeps_chain() {
        let source = anyhow::anyhow!("disk unplugged").context("writing frame");
        let err = AppError::from(source);
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert_eq!(err.client_message(), "Internal error");
        assert!(err.detailed_message().contains("Caused by"));
    }

    #[test]
    fn test_io_conversion() {
        let err = AppError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, AppError::Internal(_)));
    }
}
