//! FFmpeg-backed frame encoding and audio muxing.

use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Encoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame is {actual_width}x{actual_height}, stream expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// An open silent video stream accepting RGB frames in order.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError>;

    /// Flush and close the stream. The file is complete once this returns `Ok`.
    async fn finish(self: Box<Self>) -> Result<(), EncoderError>;
}

/// External video encoder.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Start a silent stream of `width`×`height` frames at `frame_rate` written to `path`.
    async fn open_silent(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<Box<dyn FrameSink>, EncoderError>;

    /// Combine `video` and `audio` into `output`, trimmed to the shorter stream.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), EncoderError>;

    /// Write `duration` of silent audio to `output`.
    async fn render_silence(&self, duration: Duration, output: &Path) -> Result<(), EncoderError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    mux_timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, mux_timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            mux_timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run `cmd` to completion within the mux timeout.
    async fn run_bounded(&self, mut cmd: Command) -> Result<(), EncoderError> {
        let output = tokio::time::timeout(self.mux_timeout, cmd.output())
            .await
            .map_err(|_| EncoderError::Timeout(self.mux_timeout))?
            .map_err(EncoderError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(%stderr, "ffmpeg failed");
            return Err(EncoderError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    #[tracing::instrument(skip(self, path), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "encode_frames",
        output = %path.display()
    ))]
    async fn open_silent(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<Box<dyn FrameSink>, EncoderError> {
        let mut cmd = self.command();
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(frame_rate.to_string())
            .args(["-i", "-", "-an", "-c:v", "mpeg4", "-q:v", "3"])
            // mpeg4 needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .arg(path)
            .stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(EncoderError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Io(std::io::Error::other("encoder stdin unavailable")))?;

        Ok(Box::new(FfmpegFrameSink {
            child,
            stdin: Some(stdin),
            width,
            height,
            frames: 0,
        }))
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "mux"
    ))]
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), EncoderError> {
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
            .arg(output);
        self.run_bounded(cmd).await
    }

    #[tracing::instrument(skip(self), fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "silence"
    ))]
    async fn render_silence(&self, duration: Duration, output: &Path) -> Result<(), EncoderError> {
        let mut cmd = self.command();
        cmd.args(["-f", "lavfi", "-i", "anullsrc=r=44100:cl=mono", "-t"])
            .arg(format!("{:.3}", duration.as_secs_f64()))
            .args(["-c:a", "libmp3lame"])
            .arg(output);
        self.run_bounded(cmd).await
    }
}

struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames: u64,
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(EncoderError::FrameSize {
                width: self.width,
                height: self.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncoderError::Io(std::io::Error::other("frame stream closed")))?;
        stdin.write_all(frame.as_raw()).await?;
        self.frames += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<(), EncoderError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
        }
        let frames = self.frames;
        let output = self.child.wait_with_output().await?;
        if !output.status.success() {
            return Err(EncoderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(frames, "Silent stream finished");
        Ok(())
    }
}
