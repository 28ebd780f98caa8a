//! Test helpers: fake media tools and a fully wired AvatarService.
//!
//! Nothing here shells out to FFmpeg or calls a remote API; every service runs
//! in demo mode against temp directories.

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

use fakes::{FixedProbe, GatedEncoder, StaticFaces};
use mimic_core::FaceBox;
use mimic_processing::{
    AvatarPipeline, GenerationTaskTracker, ReferenceImageValidator, VoiceSampleValidator,
};
use mimic_services::{
    AvatarComponents, AvatarService, ChatService, TranscriptionService, UploadService, VoiceService,
};
use mimic_storage::LocalFileStore;
use std::sync::Arc;
use tempfile::TempDir;

pub const MB: usize = 1024 * 1024;

/// Service plus the fakes and directories backing it.
pub struct TestApp {
    pub service: AvatarService,
    pub encoder: Arc<GatedEncoder>,
    pub _upload_dir: TempDir,
    pub _output_dir: TempDir,
}

pub struct TestAppOptions {
    pub audio_secs: f64,
    pub workers: usize,
    pub capacity: usize,
    pub gated: bool,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            audio_secs: 0.4,
            workers: 2,
            capacity: 8,
            gated: false,
        }
    }
}

pub async fn setup_test_app(options: TestAppOptions) -> TestApp {
    let upload_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let uploads = LocalFileStore::new(upload_dir.path()).await.unwrap();
    let outputs = LocalFileStore::new(output_dir.path()).await.unwrap();

    let probe = Arc::new(FixedProbe::new(options.audio_secs));
    let encoder = Arc::new(GatedEncoder::new(options.gated));
    let faces = Arc::new(StaticFaces(vec![FaceBox::new(96, 64, 128, 160)]));

    let upload_service = UploadService::new(
        uploads,
        ReferenceImageValidator::new(faces),
        VoiceSampleValidator::new(probe.clone()),
        5 * MB,
        10 * MB,
    );
    let voice = VoiceService::new(None, outputs.clone(), encoder.clone(), probe.clone());
    let pipeline = AvatarPipeline::new(probe, encoder.clone(), GenerationTaskTracker::in_memory());

    let service = AvatarService::new(AvatarComponents {
        uploads: Arc::new(upload_service),
        voice: Arc::new(voice),
        transcription: TranscriptionService::new(None),
        chat: Arc::new(ChatService::new(None)),
        pipeline,
        outputs,
        render_workers: options.workers,
        render_queue_capacity: options.capacity,
    });

    TestApp {
        service,
        encoder,
        _upload_dir: upload_dir,
        _output_dir: output_dir,
    }
}
