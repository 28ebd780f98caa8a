use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing status: {}", s)),
        }
    }
}

/// One video generation attempt.
///
/// Progress never decreases while processing, is exactly 100 when completed,
/// and `output_path` is set only once completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationTask {
    pub id: String,
    pub image_id: String,
    pub status: ProcessingStatus,
    pub progress: u8,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn new(id: impl Into<String>, image_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            image_id: image_id.into(),
            status: ProcessingStatus::Processing,
            progress: 0,
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn status_view(&self) -> TaskStatusView {
        TaskStatusView::from(self)
    }
}

/// Read-only status surface of a generation task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusView {
    pub status: ProcessingStatus,
    pub progress: u8,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl From<&GenerationTask> for TaskStatusView {
    fn from(task: &GenerationTask) -> Self {
        Self {
            status: task.status,
            progress: task.progress,
            output_path: task.output_path.clone(),
            error: task.error.clone(),
        }
    }
}

fn default_expression_scale() -> f64 {
    1.0
}

/// NaN and infinities slip past `range`, so finiteness is checked separately.
fn validate_finite_scale(request: &GenerateRequest) -> Result<(), ValidationError> {
    if request.expression_scale.is_finite() {
        Ok(())
    } else {
        let mut err = ValidationError::new("expression_scale_not_finite");
        err.message = Some("Expression scale must be a finite number".into());
        Err(err)
    }
}

/// Request to animate an uploaded image against an audio track.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_finite_scale"))]
pub struct GenerateRequest {
    #[validate(length(min = 1, message = "Image ID is required"))]
    pub image_id: String,
    pub audio_path: PathBuf,
    #[serde(default = "default_expression_scale")]
    #[validate(range(
        min = 0.5,
        max = 2.0,
        message = "Expression scale must be between 0.5 and 2.0"
    ))]
    pub expression_scale: f64,
}

impl GenerateRequest {
    pub fn new(image_id: impl Into<String>, audio_path: impl Into<PathBuf>) -> Self {
        Self {
            image_id: image_id.into(),
            audio_path: audio_path.into(),
            expression_scale: default_expression_scale(),
        }
    }

    pub fn with_expression_scale(mut self, expression_scale: f64) -> Self {
        self.expression_scale = expression_scale;
        self
    }
}

/// Request to speak arbitrary text through a cloned voice and uploaded face.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SpeakRequest {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Text must be between 1 and 5000 characters"
    ))]
    pub text: String,
    #[validate(length(min = 1, message = "Clone ID is required"))]
    pub clone_id: String,
    #[validate(length(min = 1, message = "Image ID is required"))]
    pub image_id: String,
    /// Only synthesize audio, skip the video render.
    #[serde(default)]
    pub preview_only: bool,
}
