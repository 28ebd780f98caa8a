//! End-to-end avatar flows
//!
//! [`AvatarService`] ties the upload store, voice synthesis, transcription,
//! chat, and the render queue together. Generation requests return a task id
//! right away; callers poll [`AvatarService::status`] until the task is
//! terminal and then fetch the file with [`AvatarService::video_path`].

use anyhow::Context;
use mimic_core::{
    ChatRequest, Config, GenerateRequest, MediaKind, ProcessingStatus, SpeakRequest,
    SynthesisRequest, SynthesizedAudio, TaskStatusView,
};
use mimic_processing::{
    AvatarPipeline, ExternalFaceDetector, FfmpegEncoder, FfprobeAudioProbe, GenerationTaskTracker,
    ReferenceImageValidator, VoiceSampleValidator,
};
use mimic_storage::LocalFileStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use validator::Validate;

use crate::chat::{AnthropicClient, ChatModel, ChatReply, ChatService};
use crate::error::{ServiceError, ServiceResult};
use crate::render_queue::{RenderJob, RenderQueue};
use crate::stt::{Transcriber, Transcription, TranscriptionService, WhisperClient};
use crate::uploads::UploadService;
use crate::voice::{ElevenLabsClient, SpeechSynthesizer, VoiceService};

/// Everything [`AvatarService`] is assembled from.
pub struct AvatarComponents {
    pub uploads: Arc<UploadService>,
    pub voice: Arc<VoiceService>,
    pub transcription: TranscriptionService,
    pub chat: Arc<ChatService>,
    pub pipeline: AvatarPipeline,
    pub outputs: LocalFileStore,
    pub render_workers: usize,
    pub render_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakOutcome {
    pub audio: SynthesizedAudio,
    /// Absent for preview-only requests.
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub reply: ChatReply,
    pub audio: Option<SynthesizedAudio>,
    pub task_id: Option<String>,
    /// Why audio or video is missing when it was requested.
    pub media_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTurn {
    pub transcription: Transcription,
    pub turn: ChatTurn,
}

pub struct AvatarService {
    uploads: Arc<UploadService>,
    voice: Arc<VoiceService>,
    transcription: TranscriptionService,
    chat: Arc<ChatService>,
    tracker: GenerationTaskTracker,
    queue: RenderQueue,
    outputs: LocalFileStore,
}

impl AvatarService {
    /// Assemble the service and start the render workers on the current runtime.
    pub fn new(components: AvatarComponents) -> Self {
        let tracker = components.pipeline.tracker().clone();
        let queue = RenderQueue::new(
            components.pipeline,
            components.render_workers,
            components.render_queue_capacity,
        );
        Self {
            uploads: components.uploads,
            voice: components.voice,
            transcription: components.transcription,
            chat: components.chat,
            tracker,
            queue,
            outputs: components.outputs,
        }
    }

    /// Wire the FFmpeg tools, the face detector and the API clients from `config`.
    ///
    /// Each API client is only created when its key is set; the matching
    /// service runs in demo mode otherwise.
    /// A missing face detector command is an error.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upload_files = LocalFileStore::new(config.upload_dir())
            .await
            .context("Failed to initialize upload directory")?;
        let outputs = LocalFileStore::new(config.output_dir())
            .await
            .context("Failed to initialize output directory")?;

        let probe = Arc::new(FfprobeAudioProbe::new(
            config.ffprobe_path.clone(),
            config.ffmpeg_path.clone(),
        ));
        let encoder = Arc::new(FfmpegEncoder::new(
            config.ffmpeg_path.clone(),
            config.mux_timeout(),
        ));
        let detector = Arc::new(ExternalFaceDetector::new(config.face_detector_cmd()?));

        let uploads = UploadService::new(
            upload_files,
            ReferenceImageValidator::new(detector),
            VoiceSampleValidator::new(probe.clone()),
            config.max_image_file_size_bytes(),
            config.max_voice_file_size_bytes(),
        );

        let timeout = config.http_timeout();
        let synthesizer = match config.elevenlabs_api_key() {
            Some(key) => Some(Arc::new(ElevenLabsClient::new(key, timeout)?) as Arc<dyn SpeechSynthesizer>),
            None => None,
        };
        let transcriber = match config.openai_api_key() {
            Some(key) => Some(Arc::new(WhisperClient::new(key)?) as Arc<dyn Transcriber>),
            None => None,
        };
        let model = match config.anthropic_api_key() {
            Some(key) => Some(Arc::new(AnthropicClient::new(
                key,
                config.llm_model.clone(),
                config.llm_max_tokens,
                timeout,
            )?) as Arc<dyn ChatModel>),
            None => None,
        };

        let voice = VoiceService::new(synthesizer, outputs.clone(), encoder.clone(), probe.clone());
        let pipeline = AvatarPipeline::new(probe, encoder, GenerationTaskTracker::in_memory());

        info!(
            voice_demo = voice.is_demo(),
            transcription_demo = transcriber.is_none(),
            chat_demo = model.is_none(),
            render_workers = config.render_workers,
            "Avatar service configured"
        );

        Ok(Self::new(AvatarComponents {
            uploads: Arc::new(uploads),
            voice: Arc::new(voice),
            transcription: TranscriptionService::new(transcriber),
            chat: Arc::new(ChatService::new(model)),
            pipeline,
            outputs,
            render_workers: config.render_workers,
            render_queue_capacity: config.render_queue_capacity,
        }))
    }

    pub fn uploads(&self) -> &Arc<UploadService> {
        &self.uploads
    }

    pub fn voice(&self) -> &Arc<VoiceService> {
        &self.voice
    }

    pub fn transcription(&self) -> &TranscriptionService {
        &self.transcription
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.chat
    }

    pub fn tracker(&self) -> &GenerationTaskTracker {
        &self.tracker
    }

    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    /// Start rendering `request` in the background and return its task id.
    #[tracing::instrument(skip(self, request), fields(image_id = %request.image_id))]
    pub async fn request_generation(&self, request: &GenerateRequest) -> ServiceResult<String> {
        request.validate()?;
        let image_path = self.uploads.image_path(&request.image_id).await?;

        let task_id = self.tracker.create(&request.image_id).await?;
        let output_path = self.outputs.path_for(MediaKind::Video, &task_id, ".mp4")?;

        let job = RenderJob {
            task_id: task_id.clone(),
            image_path,
            audio_path: request.audio_path.clone(),
            expression_scale: request.expression_scale,
            output_path,
        };
        if let Err(e) = self.queue.enqueue(job) {
            self.tracker.mark_failed(&task_id, &e.to_string()).await?;
            return Err(e);
        }

        info!(task_id = %task_id, "Generation requested");
        Ok(task_id)
    }

    pub async fn status(&self, task_id: &str) -> ServiceResult<TaskStatusView> {
        self.tracker
            .status(task_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Task".to_string()))
    }

    /// The finished video, or `None` while the task is not completed or the
    /// file has gone missing.
    pub async fn video_path(&self, task_id: &str) -> ServiceResult<Option<PathBuf>> {
        let status = self.status(task_id).await?;
        if status.status != ProcessingStatus::Completed {
            return Ok(None);
        }
        let Some(path) = status.output_path else {
            return Ok(None);
        };
        Ok(tokio::fs::try_exists(&path)
            .await
            .unwrap_or(false)
            .then_some(path))
    }

    /// Speak `request.text` in a cloned voice, then animate the face unless
    /// only a preview was asked for.
    #[tracing::instrument(skip(self, request), fields(clone_id = %request.clone_id, image_id = %request.image_id))]
    pub async fn speak(&self, request: &SpeakRequest) -> ServiceResult<SpeakOutcome> {
        request.validate()?;
        self.require_clone(&request.clone_id).await?;
        if !request.preview_only {
            self.uploads.image_path(&request.image_id).await?;
        }

        let audio = self
            .voice
            .synthesize(&SynthesisRequest::new(&request.clone_id, &request.text))
            .await?;

        let task_id = if request.preview_only {
            None
        } else {
            let generate = GenerateRequest::new(&request.image_id, audio.path.clone());
            Some(self.request_generation(&generate).await?)
        };

        Ok(SpeakOutcome { audio, task_id })
    }

    /// One chat exchange, optionally voiced and animated.
    ///
    /// Media is produced only when `generate_video` is set and both a clone
    /// and an image are given. Failures while producing media are reported in
    /// [`ChatTurn::media_error`]; the text reply is still returned.
    #[tracing::instrument(skip(self, request), fields(conversation_id = ?request.conversation_id))]
    pub async fn chat_turn(&self, request: &ChatRequest) -> ServiceResult<ChatTurn> {
        request.validate()?;
        self.chat.filter_content(&request.message)?;

        let media = match (&request.clone_id, &request.image_id) {
            (Some(clone_id), Some(image_id)) if request.generate_video => {
                self.require_clone(clone_id).await?;
                self.uploads.image_path(image_id).await?;
                Some((clone_id.as_str(), image_id.as_str()))
            }
            _ => None,
        };

        let reply = self
            .chat
            .chat(&request.message, request.conversation_id.as_deref())
            .await?;

        let mut turn = ChatTurn {
            reply,
            audio: None,
            task_id: None,
            media_error: None,
        };
        let Some((clone_id, image_id)) = media else {
            return Ok(turn);
        };

        let synthesis = SynthesisRequest::new(clone_id, &turn.reply.response.content);
        let audio = match self.voice.synthesize(&synthesis).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed, returning text reply only");
                turn.media_error = Some(e.to_string());
                return Ok(turn);
            }
        };

        let generate = GenerateRequest::new(image_id, audio.path.clone());
        match self.request_generation(&generate).await {
            Ok(task_id) => turn.task_id = Some(task_id),
            Err(e) => {
                warn!(error = %e, "Avatar generation could not be started");
                turn.media_error = Some(e.to_string());
            }
        }

        turn.reply.response.audio_path = Some(audio.path.clone());
        turn.reply.response.video_id = turn.task_id.clone();
        self.chat
            .annotate_reply(
                &turn.reply.conversation_id,
                Some(audio.path.clone()),
                turn.task_id.clone(),
            )
            .await?;
        turn.audio = Some(audio);
        Ok(turn)
    }

    /// Transcribe a recorded message and handle it as a chat turn.
    #[tracing::instrument(skip(self, data, request), fields(size_bytes = data.len()))]
    pub async fn voice_turn(
        &self,
        data: &[u8],
        filename: &str,
        request: VoiceTurnRequest,
    ) -> ServiceResult<VoiceTurn> {
        let audio_path = self.uploads.save_voice_message(data, filename).await?;
        let transcription = self
            .transcription
            .transcribe(&audio_path, request.language.as_deref())
            .await?;

        let chat = ChatRequest {
            message: transcription.text.clone(),
            clone_id: request.clone_id,
            image_id: request.image_id,
            conversation_id: request.conversation_id,
            generate_video: request.generate_video,
        };
        let turn = self.chat_turn(&chat).await?;
        Ok(VoiceTurn {
            transcription,
            turn,
        })
    }

    /// Block until `task_id` is terminal, checking every `poll`.
    pub async fn wait_for(&self, task_id: &str, poll: Duration) -> ServiceResult<TaskStatusView> {
        loop {
            let status = self.status(task_id).await?;
            if status.status.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(poll).await;
        }
    }

    #[cfg(feature = "cleanup")]
    pub fn retention_sweeper(
        &self,
        retention: Duration,
        every: Duration,
    ) -> crate::retention::RetentionSweeper {
        crate::retention::RetentionSweeper::new(
            self.tracker.clone(),
            self.chat.clone(),
            self.uploads.clone(),
            self.outputs.clone(),
            retention,
            every,
        )
    }

    async fn require_clone(&self, clone_id: &str) -> ServiceResult<()> {
        match self.voice.clone_status(clone_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound("Voice clone".to_string())),
        }
    }
}

/// Routing for a recorded voice message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceTurnRequest {
    pub clone_id: Option<String>,
    pub image_id: Option<String>,
    pub conversation_id: Option<String>,
    pub language: Option<String>,
    pub generate_video: bool,
}
