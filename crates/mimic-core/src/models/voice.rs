use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use super::task::ProcessingStatus;

/// An uploaded, validated voice sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSample {
    pub id: String,
    pub path: PathBuf,
    pub original_filename: String,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
}

/// A voice synthesis profile derived from a voice sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceClone {
    pub clone_id: String,
    pub voice_id: String,
    pub name: String,
    pub status: ProcessingStatus,
    /// False when the clone only exists locally (demo mode).
    pub remote: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesizedAudio {
    pub audio_id: String,
    pub clone_id: String,
    pub text: String,
    pub path: PathBuf,
    pub duration_secs: f64,
}

fn default_stability() -> f64 {
    0.5
}

fn default_similarity_boost() -> f64 {
    0.75
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SynthesisRequest {
    #[validate(length(min = 1, message = "Clone ID is required"))]
    pub clone_id: String,
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Text must be between 1 and 5000 characters"
    ))]
    pub text: String,
    #[serde(default = "default_stability")]
    #[validate(range(min = 0.0, max = 1.0, message = "Stability must be between 0 and 1"))]
    pub stability: f64,
    #[serde(default = "default_similarity_boost")]
    #[validate(range(
        min = 0.0,
        max = 1.0,
        message = "Similarity boost must be between 0 and 1"
    ))]
    pub similarity_boost: f64,
}

impl SynthesisRequest {
    pub fn new(clone_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            clone_id: clone_id.into(),
            text: text.into(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
        }
    }
}
