//! Audio processor - duration, stream info and loudness via ffprobe/ffmpeg

use crate::metadata::AudioMetadata;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },

    #[error("Failed to parse probe output: {0}")]
    Parse(String),

    #[error("Audio has no measurable duration")]
    NoDuration,
}

/// Reads duration and loudness of an audio file.
#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<AudioMetadata, ProbeError>;

    /// Duration in seconds, without measuring loudness.
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        Ok(self.probe(path).await?.duration_secs)
    }
}

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    format: Option<FFprobeFormat>,
    streams: Option<Vec<FFprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    sample_rate: Option<String>,
    channels: Option<i32>,
    codec_name: Option<String>,
    duration: Option<String>,
}

pub struct FfprobeAudioProbe {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfprobeAudioProbe {
    pub fn new(ffprobe_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn run(mut command: Command, tool: &str) -> Result<std::process::Output, ProbeError> {
        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(tool = %tool, %stderr, "Probe command failed");
            return Err(ProbeError::Failed {
                tool: tool.to_string(),
                stderr,
            });
        }
        Ok(output)
    }

    async fn stream_info(&self, path: &Path) -> Result<AudioMetadata, ProbeError> {
        let mut ffprobe = Command::new(&self.ffprobe_path);
        ffprobe
            .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
            .arg(path);
        let output = Self::run(ffprobe, "ffprobe").await?;
        Self::parse_ffprobe(&output.stdout)
    }

    fn parse_ffprobe(stdout: &[u8]) -> Result<AudioMetadata, ProbeError> {
        let json_output: FFprobeOutput =
            serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

        let audio_stream = json_output.streams.and_then(|streams| {
            streams
                .into_iter()
                .find(|s| s.codec_type.as_deref() == Some("audio"))
        });

        // Some containers only report duration on the stream.
        let duration = json_output
            .format
            .as_ref()
            .and_then(|f| f.duration.as_ref())
            .or_else(|| audio_stream.as_ref().and_then(|s| s.duration.as_ref()))
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or(ProbeError::NoDuration)?;

        let bitrate = json_output
            .format
            .as_ref()
            .and_then(|f| f.bit_rate.as_ref())
            .and_then(|b| b.parse::<i32>().ok());

        Ok(AudioMetadata {
            duration_secs: duration,
            bitrate,
            sample_rate: audio_stream
                .as_ref()
                .and_then(|s| s.sample_rate.as_ref())
                .and_then(|sr| sr.parse::<i32>().ok()),
            channels: audio_stream.as_ref().and_then(|s| s.channels),
            codec: audio_stream.and_then(|s| s.codec_name),
            ..AudioMetadata::default()
        })
    }
}

/// Pull `(max_volume, mean_volume)` in dBFS out of ffmpeg `volumedetect` output.
pub fn parse_volume_levels(stderr: &str) -> Result<(Option<f64>, Option<f64>), regex::Error> {
    let max_re = Regex::new(r"max_volume:\s*(-?[0-9.]+|-inf)\s*dB")?;
    let mean_re = Regex::new(r"mean_volume:\s*(-?[0-9.]+|-inf)\s*dB")?;

    let level = |re: &Regex| {
        re.captures(stderr).and_then(|c| match &c[1] {
            "-inf" => Some(f64::NEG_INFINITY),
            value => value.parse::<f64>().ok(),
        })
    };

    Ok((level(&max_re), level(&mean_re)))
}

#[async_trait]
impl AudioProbe for FfprobeAudioProbe {
    #[tracing::instrument(skip(self, path), fields(service = "audio", file = %path.display()))]
    async fn probe(&self, path: &Path) -> Result<AudioMetadata, ProbeError> {
        let mut metadata = self.stream_info(path).await?;

        let mut ffmpeg = Command::new(&self.ffmpeg_path);
        ffmpeg
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .args(["-af", "volumedetect", "-vn", "-f", "null", "-"]);
        let volume = Self::run(ffmpeg, "ffmpeg").await?;
        let (peak, mean) = parse_volume_levels(&String::from_utf8_lossy(&volume.stderr))
            .map_err(|e| ProbeError::Parse(e.to_string()))?;
        metadata.peak_dbfs = peak;
        metadata.mean_dbfs = mean;

        debug!(
            duration_secs = metadata.duration_secs,
            peak_dbfs = ?metadata.peak_dbfs,
            "Probed audio"
        );
        Ok(metadata)
    }

    #[tracing::instrument(skip(self, path), fields(service = "audio", file = %path.display()))]
    async fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        Ok(self.stream_info(path).await?.duration_secs)
    }
}
