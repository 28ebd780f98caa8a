//! In-process stand-ins for the probe, encoder and face detector.

use async_trait::async_trait;
use image::RgbImage;
use mimic_core::FaceBox;
use mimic_processing::audio::ProbeError;
use mimic_processing::image::DetectorError;
use mimic_processing::{AudioMetadata, AudioProbe, EncoderError, FaceDetector, FrameSink, VideoEncoder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Reports every file as `duration_secs` long with audible content.
pub struct FixedProbe {
    duration_secs: f64,
}

impl FixedProbe {
    pub fn new(duration_secs: f64) -> Self {
        Self { duration_secs }
    }
}

#[async_trait]
impl AudioProbe for FixedProbe {
    async fn probe(&self, path: &Path) -> Result<AudioMetadata, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::Failed {
                tool: "ffprobe".to_string(),
                stderr: format!("{}: No such file or directory", path.display()),
            });
        }
        Ok(AudioMetadata {
            peak_dbfs: Some(-3.0),
            mean_dbfs: Some(-20.0),
            ..AudioMetadata::with_duration(self.duration_secs)
        })
    }
}

pub struct StaticFaces(pub Vec<FaceBox>);

#[async_trait]
impl FaceDetector for StaticFaces {
    async fn detect(&self, _path: &Path) -> Result<Vec<FaceBox>, DetectorError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct EncoderStats {
    pub opened: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub frames: AtomicUsize,
    pub silences: AtomicUsize,
}

/// Encoder writing placeholder files.
///
/// When gated, every silent stream waits for a permit released with
/// [`GatedEncoder::release`] before accepting frames, which keeps renders
/// "running" for as long as a test needs.
pub struct GatedEncoder {
    gate: Option<Arc<Semaphore>>,
    pub stats: Arc<EncoderStats>,
}

impl GatedEncoder {
    pub fn new(gated: bool) -> Self {
        Self {
            gate: gated.then(|| Arc::new(Semaphore::new(0))),
            stats: Arc::new(EncoderStats::default()),
        }
    }

    pub fn release(&self, renders: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(renders);
        }
    }

    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.stats.max_running.load(Ordering::SeqCst)
    }
}

struct PlaceholderSink {
    path: PathBuf,
    stats: Arc<EncoderStats>,
}

#[async_trait]
impl FrameSink for PlaceholderSink {
    async fn write_frame(&mut self, _frame: &RgbImage) -> Result<(), EncoderError> {
        self.stats.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), EncoderError> {
        self.stats.running.fetch_sub(1, Ordering::SeqCst);
        std::fs::write(&self.path, b"silent video")?;
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for GatedEncoder {
    async fn open_silent(
        &self,
        path: &Path,
        _width: u32,
        _height: u32,
        _frame_rate: u32,
    ) -> Result<Box<dyn FrameSink>, EncoderError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let running = self.stats.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_running.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        Ok(Box::new(PlaceholderSink {
            path: path.to_path_buf(),
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn mux(&self, video: &Path, _audio: &Path, output: &Path) -> Result<(), EncoderError> {
        std::fs::copy(video, output)?;
        Ok(())
    }

    async fn render_silence(&self, _duration: Duration, output: &Path) -> Result<(), EncoderError> {
        self.stats.silences.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, b"silence")?;
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
