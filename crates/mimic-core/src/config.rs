//! Runtime configuration loaded from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_IMAGE_FILE_SIZE_MB: usize = 5;
const MAX_VOICE_FILE_SIZE_MB: usize = 10;
const RENDER_WORKERS: usize = 2;
const RENDER_QUEUE_CAPACITY: usize = 32;
const MUX_TIMEOUT_SECS: u64 = 300;
const HTTP_TIMEOUT_SECS: u64 = 120;
const RETENTION_HOURS: u64 = 24;
const SWEEP_INTERVAL_SECS: u64 = 3600;
const LLM_MAX_TOKENS: u32 = 1024;

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./outputs")
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_llm_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_llm_max_tokens() -> u32 {
    LLM_MAX_TOKENS
}

fn default_max_image_file_size_mb() -> usize {
    MAX_IMAGE_FILE_SIZE_MB
}

fn default_max_voice_file_size_mb() -> usize {
    MAX_VOICE_FILE_SIZE_MB
}

fn default_render_workers() -> usize {
    RENDER_WORKERS
}

fn default_render_queue_capacity() -> usize {
    RENDER_QUEUE_CAPACITY
}

fn default_mux_timeout_secs() -> u64 {
    MUX_TIMEOUT_SECS
}

fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

fn default_retention_hours() -> u64 {
    RETENTION_HOURS
}

fn default_sweep_interval_secs() -> u64 {
    SWEEP_INTERVAL_SECS
}

/// Application configuration.
///
/// Every field maps to the upper-cased environment variable of the same name
/// (`upload_dir` reads `UPLOAD_DIR`). Missing API keys switch the matching
/// third-party client into demo mode.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// External face detector executable. Required to wire the upload store.
    #[serde(default)]
    pub face_detector_cmd: Option<String>,
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    #[serde(default = "default_max_image_file_size_mb")]
    pub max_image_file_size_mb: usize,
    #[serde(default = "default_max_voice_file_size_mb")]
    pub max_voice_file_size_mb: usize,
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,
    #[serde(default = "default_render_queue_capacity")]
    pub render_queue_capacity: usize,
    #[serde(default = "default_mux_timeout_secs")]
    pub mux_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            face_detector_cmd: None,
            elevenlabs_api_key: None,
            anthropic_api_key: None,
            openai_api_key: None,
            llm_model: default_llm_model(),
            llm_max_tokens: LLM_MAX_TOKENS,
            max_image_file_size_mb: MAX_IMAGE_FILE_SIZE_MB,
            max_voice_file_size_mb: MAX_VOICE_FILE_SIZE_MB,
            render_workers: RENDER_WORKERS,
            render_queue_capacity: RENDER_QUEUE_CAPACITY,
            mux_timeout_secs: MUX_TIMEOUT_SECS,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            retention_hours: RETENTION_HOURS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Config =
            envy::from_env().context("Failed to read configuration from environment")?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from explicit key/value pairs, applying the same defaults
    /// and validation as [`Config::from_env`].
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config =
            envy::from_iter(pairs).context("Failed to read configuration values")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render_workers == 0 {
            anyhow::bail!("RENDER_WORKERS must be at least 1");
        }
        if self.render_queue_capacity == 0 {
            anyhow::bail!("RENDER_QUEUE_CAPACITY must be at least 1");
        }
        if self.retention_hours == 0 {
            anyhow::bail!("RETENTION_HOURS must be positive");
        }
        if self.mux_timeout_secs == 0 {
            anyhow::bail!("MUX_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn max_image_file_size_bytes(&self) -> usize {
        self.max_image_file_size_mb * 1024 * 1024
    }

    pub fn max_voice_file_size_bytes(&self) -> usize {
        self.max_voice_file_size_mb * 1024 * 1024
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_secs(self.mux_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn elevenlabs_api_key(&self) -> Option<&str> {
        non_empty(&self.elevenlabs_api_key)
    }

    pub fn anthropic_api_key(&self) -> Option<&str> {
        non_empty(&self.anthropic_api_key)
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        non_empty(&self.openai_api_key)
    }

    /// Reference images cannot be face-checked without a detector, so a missing
    /// command is a configuration error rather than a pass.
    pub fn face_detector_cmd(&self) -> Result<&str> {
        non_empty(&self.face_detector_cmd)
            .context("FACE_DETECTOR_CMD must be set to check reference images for faces")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
