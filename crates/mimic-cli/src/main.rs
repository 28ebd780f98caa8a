//! Mimic CLI: run the avatar pipeline and its services from the terminal.
//!
//! Configuration comes from the environment (and `.env`); see `mimic_core::Config`.
//! Without API keys the voice, transcription and chat services run in demo mode.
//! `FACE_DETECTOR_CMD` must name the face detector used to check reference images.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mimic_cli::{classify_error, init_tracing, progress_bar, report_error, truncate_chars};
use mimic_core::{ChatRequest, Config, GenerateRequest, ProcessingStatus, SpeakRequest, TaskStatusView};
use mimic_processing::{
    ExternalFaceDetector, FfprobeAudioProbe, ReferenceImageValidator, VoiceSampleValidator,
};
use mimic_services::AvatarService;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "mimic", about = "Talking-avatar generation CLI")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an image is usable as an avatar reference
    ValidateImage {
        path: PathBuf,
    },
    /// Check that an audio file is usable as a voice sample
    ValidateAudio {
        path: PathBuf,
    },
    /// Validate, store and crop a reference image
    UploadImage {
        path: PathBuf,
    },
    /// Animate an image against an audio track
    Generate {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        audio: PathBuf,
        /// Expression scale between 0.5 and 2.0
        #[arg(long, default_value = "1.0")]
        scale: f64,
        /// Copy the finished video here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Clone a voice from a sample and make the image speak text with it
    Speak {
        #[arg(long)]
        image: PathBuf,
        /// Voice sample to clone
        #[arg(long)]
        voice: PathBuf,
        #[arg(long)]
        text: String,
        /// Only synthesize the audio
        #[arg(long)]
        preview: bool,
    },
    /// Send one chat message
    Chat {
        #[arg(long)]
        message: String,
        #[arg(long)]
        persona: Option<String>,
        #[arg(long)]
        conversation_id: Option<String>,
    },
    /// Transcribe an audio file
    Transcribe {
        path: PathBuf,
        #[arg(long)]
        language: Option<String>,
    },
    /// Run one retention pass over tasks, conversations and media files
    Sweep {
        /// Keep sweeping every SWEEP_INTERVAL_SECS until interrupted
        #[arg(long)]
        watch: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Poll the task until it is terminal, drawing its progress on stderr.
async fn follow(service: &AvatarService, task_id: &str) -> anyhow::Result<TaskStatusView> {
    loop {
        let status = service.status(task_id).await?;
        eprint!("\r{} {}", progress_bar(status.progress, 30), status.status);
        if status.status.is_terminal() {
            eprintln!();
            return Ok(status);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(cli.json || config.as_ref().is_ok_and(Config::is_production));

    let result = match config {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&classify_error(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::ValidateImage { path } => {
            let detector = Arc::new(ExternalFaceDetector::new(config.face_detector_cmd()?));
            let report = ReferenceImageValidator::new(detector).validate(&path).await?;
            print_json(&report)?;
        }
        Commands::ValidateAudio { path } => {
            let probe = Arc::new(FfprobeAudioProbe::new(
                config.ffprobe_path.clone(),
                config.ffmpeg_path.clone(),
            ));
            let metadata = VoiceSampleValidator::new(probe).validate(&path).await?;
            print_json(&metadata)?;
        }
        Commands::UploadImage { path } => {
            let service = AvatarService::from_config(&config).await?;
            let image = service
                .uploads()
                .upload_image(&read_file(&path).await?, &file_name(&path))
                .await?;
            print_json(&image)?;
        }
        Commands::Generate {
            image,
            audio,
            scale,
            output,
        } => {
            let service = AvatarService::from_config(&config).await?;
            let uploaded = service
                .uploads()
                .upload_image(&read_file(&image).await?, &file_name(&image))
                .await?;
            let request = GenerateRequest::new(uploaded.id, audio).with_expression_scale(scale);
            let task_id = service.request_generation(&request).await?;
            tracing::info!(task_id = %task_id, "Generation started");

            let status = follow(&service, &task_id).await?;
            if status.status == ProcessingStatus::Failed {
                bail!(
                    "Generation failed: {}",
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            if let (Some(dest), Some(video)) = (output, service.video_path(&task_id).await?) {
                tokio::fs::copy(&video, &dest)
                    .await
                    .with_context(|| format!("Failed to copy video to {}", dest.display()))?;
            }
            print_json(&status)?;
        }
        Commands::Speak {
            image,
            voice,
            text,
            preview,
        } => {
            let service = AvatarService::from_config(&config).await?;
            let uploaded = service
                .uploads()
                .upload_image(&read_file(&image).await?, &file_name(&image))
                .await?;
            let sample = service
                .uploads()
                .upload_voice_sample(&read_file(&voice).await?, &file_name(&voice))
                .await?;
            let clone = service
                .voice()
                .create_clone(&sample.id, &sample.path, &sample.original_filename, None)
                .await?;

            let outcome = service
                .speak(&SpeakRequest {
                    text,
                    clone_id: clone.clone_id,
                    image_id: uploaded.id,
                    preview_only: preview,
                })
                .await?;
            if let Some(task_id) = &outcome.task_id {
                follow(&service, task_id).await?;
            }
            print_json(&outcome)?;
        }
        Commands::Chat {
            message,
            persona,
            conversation_id,
        } => {
            let service = AvatarService::from_config(&config).await?;
            let conversation_id = match (conversation_id, persona) {
                (Some(id), _) => Some(id),
                (None, Some(persona)) => Some(service.chat().create(Some(persona)).await?),
                (None, None) => None,
            };
            let turn = service
                .chat_turn(&ChatRequest {
                    message,
                    clone_id: None,
                    image_id: None,
                    conversation_id,
                    generate_video: false,
                })
                .await?;
            tracing::debug!(reply = %truncate_chars(&turn.reply.response.content, 80), "Chat reply");
            print_json(&turn.reply)?;
        }
        Commands::Transcribe { path, language } => {
            let service = AvatarService::from_config(&config).await?;
            let transcription = service
                .transcription()
                .transcribe(&path, language.as_deref())
                .await?;
            print_json(&transcription)?;
        }
        Commands::Sweep { watch } => {
            let service = AvatarService::from_config(&config).await?;
            let sweeper = service.retention_sweeper(config.retention(), config.sweep_interval());
            if watch {
                let handle = Arc::new(sweeper).start();
                tracing::info!(
                    every_secs = config.sweep_interval().as_secs(),
                    "Retention sweeper running, press Ctrl-C to stop"
                );
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
                handle.abort();
            } else {
                print_json(&sweeper.sweep_once().await)?;
            }
        }
    }

    Ok(())
}
