//! Voice cloning and speech synthesis
//!
//! Backed by the ElevenLabs API when a key is configured. Without a key the
//! service runs in demo mode: clones are registered locally and synthesis
//! produces silence of a length proportional to the text.

use crate::error::{ServiceError, ServiceResult};
use crate::http::{audio_mime, build_client, check_status, file_part};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use mimic_core::{MediaKind, ProcessingStatus, SynthesisRequest, SynthesizedAudio, VoiceClone};
use mimic_processing::{AudioProbe, VideoEncoder};
use mimic_storage::{LocalFileStore, MemoryStore, Store};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const SERVICE: &str = "elevenlabs";
const TTS_MODEL: &str = "eleven_multilingual_v2";
const CLONE_TIMEOUT: Duration = Duration::from_secs(60);
const TTS_TIMEOUT: Duration = Duration::from_secs(120);

/// Demo-mode silence: 80 ms per character, at least one second.
const DEMO_MS_PER_CHAR: u64 = 80;
const DEMO_MIN_MS: u64 = 1000;

/// A voice as listed by the remote provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteVoice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Text-to-speech provider able to clone voices from samples.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Create a voice from `sample`; returns the provider's voice id.
    async fn clone_voice(
        &self,
        sample: &Path,
        name: &str,
        description: &str,
    ) -> ServiceResult<String>;

    /// Encoded (mp3) speech for `request.text` in voice `request.clone_id`.
    async fn synthesize(&self, request: &SynthesisRequest) -> ServiceResult<Bytes>;

    async fn list_voices(&self) -> ServiceResult<Vec<RemoteVoice>>;

    async fn delete_voice(&self, clone_id: &str) -> ServiceResult<()>;
}

pub struct ElevenLabsClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct AddVoiceResponse {
    voice_id: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<RemoteVoice>,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    #[tracing::instrument(skip(self, sample), fields(service = SERVICE))]
    async fn clone_voice(
        &self,
        sample: &Path,
        name: &str,
        description: &str,
    ) -> ServiceResult<String> {
        let form = reqwest::multipart::Form::new()
            .part("files", file_part(sample, audio_mime(sample)).await?)
            .text("name", name.to_string())
            .text("description", description.to_string());

        let response = self
            .http_client
            .post(format!("{}/voices/add", self.base_url))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .timeout(CLONE_TIMEOUT)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;

        let parsed: AddVoiceResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        Ok(parsed.voice_id)
    }

    #[tracing::instrument(skip(self, request), fields(service = SERVICE, clone_id = %request.clone_id))]
    async fn synthesize(&self, request: &SynthesisRequest) -> ServiceResult<Bytes> {
        let body = json!({
            "text": request.text,
            "model_id": TTS_MODEL,
            "voice_settings": {
                "stability": request.stability,
                "similarity_boost": request.similarity_boost,
            }
        });

        let response = self
            .http_client
            .post(format!("{}/text-to-speech/{}", self.base_url, request.clone_id))
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .timeout(TTS_TIMEOUT)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;

        check_status(SERVICE, response)
            .await?
            .bytes()
            .await
            .map_err(ServiceError::http(SERVICE))
    }

    async fn list_voices(&self) -> ServiceResult<Vec<RemoteVoice>> {
        let response = self
            .http_client
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let parsed: VoicesResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        Ok(parsed.voices)
    }

    async fn delete_voice(&self, clone_id: &str) -> ServiceResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/voices/{}", self.base_url, clone_id))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        check_status(SERVICE, response).await?;
        Ok(())
    }
}

/// Clone registry plus synthesis into the output directory.
pub struct VoiceService {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    clones: Arc<dyn Store<VoiceClone>>,
    outputs: LocalFileStore,
    encoder: Arc<dyn VideoEncoder>,
    probe: Arc<dyn AudioProbe>,
}

impl VoiceService {
    /// `synthesizer = None` selects demo mode.
    pub fn new(
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        outputs: LocalFileStore,
        encoder: Arc<dyn VideoEncoder>,
        probe: Arc<dyn AudioProbe>,
    ) -> Self {
        Self {
            synthesizer,
            clones: Arc::new(MemoryStore::new()),
            outputs,
            encoder,
            probe,
        }
    }

    pub fn is_demo(&self) -> bool {
        self.synthesizer.is_none()
    }

    /// `{output_dir}/voice/{audio_id}.mp3`
    pub fn audio_path(&self, audio_id: &str) -> ServiceResult<PathBuf> {
        Ok(self.outputs.path_for(MediaKind::Voice, audio_id, ".mp3")?)
    }

    /// Register a clone of the voice sample `voice_id` stored at `sample`.
    #[tracing::instrument(skip(self, sample, description))]
    pub async fn create_clone(
        &self,
        voice_id: &str,
        sample: &Path,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<VoiceClone> {
        let (clone_id, remote) = match &self.synthesizer {
            Some(synthesizer) => {
                let description = description
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Voice clone from {}", voice_id));
                (synthesizer.clone_voice(sample, name, &description).await?, true)
            }
            None => {
                warn!(voice_id = %voice_id, "No speech API key configured, creating demo clone");
                (Uuid::new_v4().to_string(), false)
            }
        };

        let clone = VoiceClone {
            clone_id: clone_id.clone(),
            voice_id: voice_id.to_string(),
            name: name.to_string(),
            status: ProcessingStatus::Completed,
            remote,
            created_at: Utc::now(),
        };
        self.clones.put(&clone_id, clone.clone()).await?;
        info!(clone_id = %clone_id, remote, "Voice clone created");
        Ok(clone)
    }

    pub async fn clone_status(&self, clone_id: &str) -> ServiceResult<Option<VoiceClone>> {
        Ok(self.clones.get(clone_id).await?)
    }

    /// Clones known to the provider, or the local registry in demo mode.
    pub async fn list_clones(&self) -> ServiceResult<Vec<RemoteVoice>> {
        match &self.synthesizer {
            Some(synthesizer) => synthesizer.list_voices().await,
            None => Ok(self
                .clones
                .scan()
                .await?
                .into_iter()
                .map(|(_, clone)| RemoteVoice {
                    voice_id: clone.clone_id,
                    name: clone.name,
                    category: Some("demo".to_string()),
                })
                .collect()),
        }
    }

    /// Remove a clone locally and, when remote, at the provider.
    pub async fn delete_clone(&self, clone_id: &str) -> ServiceResult<bool> {
        let local = self.clones.delete(clone_id).await?;
        match &self.synthesizer {
            Some(synthesizer) => {
                synthesizer.delete_voice(clone_id).await?;
                Ok(true)
            }
            None => Ok(local.is_some()),
        }
    }

    /// Speak `request.text` in the cloned voice and store the clip.
    #[tracing::instrument(skip(self, request), fields(clone_id = %request.clone_id, chars = request.text.chars().count()))]
    pub async fn synthesize(&self, request: &SynthesisRequest) -> ServiceResult<SynthesizedAudio> {
        request.validate()?;

        let audio_id = Uuid::new_v4().to_string();
        let path = self.audio_path(&audio_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let duration_secs = match &self.synthesizer {
            Some(synthesizer) => {
                let audio = synthesizer.synthesize(request).await?;
                tokio::fs::write(&path, &audio).await?;
                self.probe.duration(&path).await?
            }
            None => {
                let duration = demo_duration(&request.text);
                self.encoder.render_silence(duration, &path).await?;
                duration.as_secs_f64()
            }
        };

        info!(audio_id = %audio_id, duration_secs, "Speech synthesized");
        Ok(SynthesizedAudio {
            audio_id,
            clone_id: request.clone_id.clone(),
            text: request.text.clone(),
            path,
            duration_secs,
        })
    }
}

/// Length of the silent placeholder clip for `text` in demo mode.
pub fn demo_duration(text: &str) -> Duration {
    let chars = text.chars().count() as u64;
    Duration::from_millis((chars * DEMO_MS_PER_CHAR).max(DEMO_MIN_MS))
}
