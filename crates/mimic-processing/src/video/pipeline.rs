//! Avatar generation pipeline
//!
//! Turns a reference image and a speech track into a talking-avatar video:
//!
//! 1. probe the audio duration,
//! 2. derive the frame count at the fixed frame rate,
//! 3. decode and downscale the reference frame,
//! 4. render each zoomed frame into a silent stream (progress 0-80),
//! 5. mux the silent stream with the audio (progress 80-100).
//!
//! Failures in steps 1-4 mark the task failed. A mux failure is not fatal: the
//! silent stream becomes the output and the task still completes
//! ([`MuxOutcome::SilentFallback`]).

use super::encoder::{EncoderError, FrameSink, VideoEncoder};
use crate::audio::AudioProbe;
use crate::image::{downscale_to_width, ImageProcessor, ZoomAnimator};
use crate::tracker::{synthesis_progress, GenerationTaskTracker};
use image::RgbImage;
use mimic_core::constants::{
    FRAME_RATE, MAX_EXPRESSION_SCALE, MAX_FRAME_WIDTH, MIN_EXPRESSION_SCALE,
    SYNTHESIS_PROGRESS_CEILING, ZOOM_AMPLITUDE,
};
use mimic_storage::StorageError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Expression scale {0} is outside 0.5..=2.0")]
    InvalidScale(f64),

    #[error("Failed to decode audio: {0}")]
    AudioDecode(String),

    #[error("Audio of {duration_secs:.3}s yields no frames")]
    EmptyTimeline { duration_secs: f64 },

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Frame rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("Failed to place output video: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task store error: {0}")]
    Storage(#[from] StorageError),
}

/// How the final video was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxOutcome {
    /// Video and audio were combined.
    Muxed,
    /// The encoder could not mux; the output is the silent stream.
    SilentFallback { reason: String },
}

impl MuxOutcome {
    pub fn has_audio(&self) -> bool {
        matches!(self, MuxOutcome::Muxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub task_id: String,
    pub output_path: PathBuf,
    pub frame_count: u64,
    pub mux: MuxOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub frame_rate: u32,
    /// Reference frames wider than this are downscaled first.
    pub max_width: u32,
    /// Zoom amplitude at expression scale 1.0.
    pub amplitude: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate: FRAME_RATE,
            max_width: MAX_FRAME_WIDTH,
            amplitude: ZOOM_AMPLITUDE,
        }
    }
}

/// Number of frames covering `duration_secs`: `floor(duration * frame_rate)`.
///
/// A small epsilon keeps exact products such as `0.12 * 25` from landing one
/// frame short through float error.
pub fn frame_count(duration_secs: f64, frame_rate: u32) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    (duration_secs * frame_rate as f64 + 1e-9).floor() as u64
}

/// Path of the silent intermediate stream for `output`.
fn silent_stream_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}.silent.mp4", stem))
}

#[derive(Clone)]
pub struct AvatarPipeline {
    probe: Arc<dyn AudioProbe>,
    encoder: Arc<dyn VideoEncoder>,
    tracker: GenerationTaskTracker,
    config: PipelineConfig,
}

impl AvatarPipeline {
    pub fn new(
        probe: Arc<dyn AudioProbe>,
        encoder: Arc<dyn VideoEncoder>,
        tracker: GenerationTaskTracker,
    ) -> Self {
        Self {
            probe,
            encoder,
            tracker,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tracker(&self) -> &GenerationTaskTracker {
        &self.tracker
    }

    /// Generate the avatar video for `task_id` at `output_path`.
    ///
    /// On return the task is either completed or failed. An `Err` carries the
    /// same description recorded on the failed task.
    #[tracing::instrument(skip_all, fields(
        task_id = %task_id,
        image = %image_path.display(),
        audio = %audio_path.display()
    ))]
    pub async fn generate(
        &self,
        image_path: &Path,
        audio_path: &Path,
        task_id: &str,
        expression_scale: f64,
        output_path: &Path,
    ) -> Result<GenerationOutcome, PipelineError> {
        match self
            .run(image_path, audio_path, task_id, expression_scale, output_path)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(store_err) = self.tracker.mark_failed(task_id, &e.to_string()).await {
                    error!(task_id = %task_id, error = %store_err, "Failed to record task failure");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        image_path: &Path,
        audio_path: &Path,
        task_id: &str,
        expression_scale: f64,
        output_path: &Path,
    ) -> Result<GenerationOutcome, PipelineError> {
        if !(MIN_EXPRESSION_SCALE..=MAX_EXPRESSION_SCALE).contains(&expression_scale) {
            return Err(PipelineError::InvalidScale(expression_scale));
        }

        let duration_secs = self
            .probe
            .duration(audio_path)
            .await
            .map_err(|e| PipelineError::AudioDecode(e.to_string()))?;
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(PipelineError::AudioDecode(format!(
                "audio has no duration ({})",
                duration_secs
            )));
        }

        let frames = frame_count(duration_secs, self.config.frame_rate);
        if frames == 0 {
            return Err(PipelineError::EmptyTimeline { duration_secs });
        }

        let (reference, _) = ImageProcessor::open(image_path)
            .await
            .map_err(|e| PipelineError::ImageDecode(format!("{:#}", e)))?;
        let base = Arc::new(downscale_to_width(reference, self.config.max_width).to_rgb8());

        info!(
            frames,
            duration_secs,
            width = base.width(),
            height = base.height(),
            "Synthesizing avatar frames"
        );

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let silent_path = silent_stream_path(output_path);
        let animator = ZoomAnimator::new(self.config.frame_rate, self.config.amplitude, expression_scale);

        if let Err(e) = self
            .synthesize(&base, animator, frames, task_id, &silent_path)
            .await
        {
            remove_quietly(&silent_path).await;
            return Err(e);
        }

        self.tracker
            .update_progress(task_id, SYNTHESIS_PROGRESS_CEILING)
            .await?;

        let mux = match self.encoder.mux(&silent_path, audio_path, output_path).await {
            Ok(()) => {
                remove_quietly(&silent_path).await;
                MuxOutcome::Muxed
            }
            Err(e) => {
                warn!(
                    task_id = %task_id,
                    error = %e,
                    "Mux failed, keeping the silent video as output"
                );
                tokio::fs::rename(&silent_path, output_path).await?;
                MuxOutcome::SilentFallback {
                    reason: e.to_string(),
                }
            }
        };

        self.tracker.mark_completed(task_id, output_path).await?;

        Ok(GenerationOutcome {
            task_id: task_id.to_string(),
            output_path: output_path.to_path_buf(),
            frame_count: frames,
            mux,
        })
    }

    /// Render `frames` frames into a silent stream at `silent_path`.
    ///
    /// Each frame is computed on the blocking pool; writes and progress
    /// updates happen in between so status reads stay live.
    async fn synthesize(
        &self,
        base: &Arc<RgbImage>,
        animator: ZoomAnimator,
        frames: u64,
        task_id: &str,
        silent_path: &Path,
    ) -> Result<(), PipelineError> {
        let mut sink: Box<dyn FrameSink> = self
            .encoder
            .open_silent(silent_path, base.width(), base.height(), self.config.frame_rate)
            .await?;

        for index in 0..frames {
            let base = Arc::clone(base);
            let frame = tokio::task::spawn_blocking(move || animator.render(&base, index))
                .await
                .map_err(|e| PipelineError::Render(e.to_string()))?;
            sink.write_frame(&frame).await?;
            self.tracker
                .update_progress(task_id, synthesis_progress(index, frames))
                .await?;
        }

        sink.finish().await?;
        debug!(task_id = %task_id, frames, "Silent stream written");
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove intermediate video");
        }
    }
}
