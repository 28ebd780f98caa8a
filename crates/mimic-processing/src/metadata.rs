//! Media metadata structures

use serde::{Deserialize, Serialize};

/// Image metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: Option<u64>,
}

/// Audio metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AudioMetadata {
    pub duration_secs: f64,
    /// Peak sample level in dBFS; `None` when it could not be measured.
    pub peak_dbfs: Option<f64>,
    /// Mean (RMS) level in dBFS.
    pub mean_dbfs: Option<f64>,
    pub bitrate: Option<i32>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub codec: Option<String>,
}

impl AudioMetadata {
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            ..Self::default()
        }
    }
}
