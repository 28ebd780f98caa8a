//! Service layer errors

use mimic_core::AppError;
use mimic_processing::{EncoderError, PipelineError, ProbeError, ValidationError};
use mimic_storage::StorageError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A third-party API answered with a non-success status.
    #[error("{service} request failed ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} request error: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    ContentRejected(String),

    #[error("Render queue is full, please try again later")]
    QueueFull,

    #[error("Task {0} already has a render queued or running")]
    Conflict(String),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("Failed to probe audio: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub(crate) fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ServiceError::Http { service, source }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Api {
                service, message, ..
            } => AppError::ExternalApi {
                service: service.to_string(),
                message,
            },
            ServiceError::Http { service, source } => AppError::ExternalApi {
                service: service.to_string(),
                message: source.to_string(),
            },
            ServiceError::Validation(e) => e.into(),
            ServiceError::InvalidRequest(msg) => AppError::InvalidInput(msg),
            ServiceError::NotFound(what) => AppError::NotFound(what),
            ServiceError::ContentRejected(msg) => AppError::ContentRejected(msg),
            ServiceError::QueueFull => AppError::QueueFull,
            ServiceError::Conflict(task_id) => {
                AppError::Conflict(format!("Render already active for task {}", task_id))
            }
            ServiceError::Encoder(e) => AppError::ExternalTool(e.to_string()),
            ServiceError::Probe(e) => AppError::Decode(e.to_string()),
            ServiceError::Pipeline(e) => match e {
                PipelineError::InvalidScale(_) => AppError::InvalidInput(e.to_string()),
                PipelineError::AudioDecode(_)
                | PipelineError::ImageDecode(_)
                | PipelineError::EmptyTimeline { .. } => AppError::Decode(e.to_string()),
                PipelineError::Encoder(_) => AppError::ExternalTool(e.to_string()),
                other => AppError::Internal(other.to_string()),
            },
            ServiceError::Storage(e) => AppError::Storage(e.to_string()),
            ServiceError::Io(e) => AppError::from(e),
        }
    }
}
