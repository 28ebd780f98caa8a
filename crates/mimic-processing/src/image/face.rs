//! Face presence detection.
//!
//! Detection runs in an external process whose command is fixed when the
//! detector is built. When that process fails at check time, the check reports
//! [`FaceCheck::DetectorUnavailable`], which still counts as a face being
//! present so uploads are not blocked by detector flakiness. Only a clean run
//! with zero matches rejects an image.

use async_trait::async_trait;
use mimic_core::FaceBox;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Failed to run face detector: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Face detector exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Failed to parse face detector output: {0}")]
    Parse(String),
}

/// Finds faces in an image file.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Bounding boxes of every detected face; empty when the image has none.
    async fn detect(&self, image_path: &Path) -> Result<Vec<FaceBox>, DetectorError>;
}

/// Cascade detector tuning passed to the external process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub scale_factor: f64,
    pub min_neighbors: u32,
    /// Minimum face side length in pixels.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 50,
        }
    }
}

/// Runs `<command> --scale-factor F --min-neighbors N --min-size S <image>` and
/// reads a JSON array of `[x, y, width, height]` boxes from stdout.
pub struct ExternalFaceDetector {
    command: String,
    params: DetectionParams,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectorOutput {
    Boxes(Vec<[i64; 4]>),
    Wrapped { faces: Vec<[i64; 4]> },
}

impl ExternalFaceDetector {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: DetectionParams::default(),
        }
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    fn parse_output(stdout: &[u8]) -> Result<Vec<FaceBox>, DetectorError> {
        let parsed: DetectorOutput =
            serde_json::from_slice(stdout).map_err(|e| DetectorError::Parse(e.to_string()))?;
        let raw = match parsed {
            DetectorOutput::Boxes(boxes) => boxes,
            DetectorOutput::Wrapped { faces } => faces,
        };

        Ok(raw
            .into_iter()
            .filter(|[_, _, w, h]| *w > 0 && *h > 0)
            .map(|[x, y, w, h]| {
                FaceBox::new(
                    x.max(0) as u32,
                    y.max(0) as u32,
                    w as u32,
                    h as u32,
                )
            })
            .collect())
    }
}

#[async_trait]
impl FaceDetector for ExternalFaceDetector {
    #[tracing::instrument(skip(self, image_path), fields(image = %image_path.display()))]
    async fn detect(&self, image_path: &Path) -> Result<Vec<FaceBox>, DetectorError> {
        let output = Command::new(&self.command)
            .arg("--scale-factor")
            .arg(self.params.scale_factor.to_string())
            .arg("--min-neighbors")
            .arg(self.params.min_neighbors.to_string())
            .arg("--min-size")
            .arg(self.params.min_size.to_string())
            .arg(image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DetectorError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let faces = Self::parse_output(&output.stdout)?;
        debug!(count = faces.len(), "Face detector finished");
        Ok(faces)
    }
}

/// Outcome of the face-presence check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceCheck {
    Detected { largest: FaceBox, count: usize },
    NotDetected,
    /// The detector errored; the image is let through.
    DetectorUnavailable { reason: String },
}

impl FaceCheck {
    pub fn face_present(&self) -> bool {
        !matches!(self, FaceCheck::NotDetected)
    }

    pub fn largest_face(&self) -> Option<FaceBox> {
        match self {
            FaceCheck::Detected { largest, .. } => Some(*largest),
            _ => None,
        }
    }
}

/// Run `detector` and apply the optimistic-pass policy.
pub async fn check_face(detector: &dyn FaceDetector, image_path: &Path) -> FaceCheck {
    match detector.detect(image_path).await {
        Ok(faces) => match faces.iter().copied().max_by_key(FaceBox::area) {
            Some(largest) => FaceCheck::Detected {
                largest,
                count: faces.len(),
            },
            None => FaceCheck::NotDetected,
        },
        Err(e) => {
            warn!(
                image = %image_path.display(),
                error = %e,
                "Face detector unavailable, assuming a face is present"
            );
            FaceCheck::DetectorUnavailable {
                reason: e.to_string(),
            }
        }
    }
}
