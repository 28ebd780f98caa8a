//! Speech-to-text through the OpenAI Whisper API

use crate::error::{ServiceError, ServiceResult};
use crate::http::{audio_mime, build_client, check_status, file_part};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const SERVICE: &str = "whisper";
const MODEL: &str = "whisper-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_LANGUAGE: &str = "ja";

/// Whisper does not report a confidence score; this is a fixed estimate.
const REPORTED_CONFIDENCE: f64 = 0.95;

const DEMO_TRANSCRIPT: &str =
    "これはデモモードの音声認識結果です。APIキーを設定すると実際の音声認識が動作します。";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub confidence: f64,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: &str) -> ServiceResult<String>;

    /// Spoken language of `audio` as an ISO-639-1 code.
    async fn detect_language(&self, audio: &Path) -> ServiceResult<String>;
}

pub struct WhisperClient {
    http_client: reqwest::Client,
    api_key: String,
    url: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
}

impl WhisperClient {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: build_client(REQUEST_TIMEOUT)?,
            api_key: api_key.into(),
            url: API_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn request(
        &self,
        audio: &Path,
        language: Option<&str>,
        response_format: &str,
    ) -> ServiceResult<TranscriptionResponse> {
        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part(audio, audio_mime(audio)).await?)
            .text("model", MODEL)
            .text("response_format", response_format.to_string());
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;

        check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(ServiceError::http(SERVICE))
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    #[tracing::instrument(skip(self, audio), fields(service = SERVICE))]
    async fn transcribe(&self, audio: &Path, language: &str) -> ServiceResult<String> {
        let response = self.request(audio, Some(language), "json").await?;
        Ok(response.text.trim().to_string())
    }

    async fn detect_language(&self, audio: &Path) -> ServiceResult<String> {
        let response = self.request(audio, None, "verbose_json").await?;
        Ok(response
            .language
            .map(|l| language_code(&l))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()))
    }
}

/// verbose_json reports language names ("japanese"); map the common ones to codes.
fn language_code(language: &str) -> String {
    match language.to_ascii_lowercase().as_str() {
        "japanese" => "ja".to_string(),
        "english" => "en".to_string(),
        "chinese" => "zh".to_string(),
        "korean" => "ko".to_string(),
        other => other.to_string(),
    }
}

/// Transcription with a demo fallback when no API key is configured.
#[derive(Clone)]
pub struct TranscriptionService {
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl TranscriptionService {
    pub fn new(transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self { transcriber }
    }

    pub fn is_demo(&self) -> bool {
        self.transcriber.is_none()
    }

    #[tracing::instrument(skip(self, audio), fields(audio = %audio.display()))]
    pub async fn transcribe(&self, audio: &Path, language: Option<&str>) -> ServiceResult<Transcription> {
        let language = language.unwrap_or(DEFAULT_LANGUAGE).to_string();
        let text = match &self.transcriber {
            Some(transcriber) => transcriber.transcribe(audio, &language).await?,
            None => {
                warn!("No transcription API key configured, returning demo transcript");
                DEMO_TRANSCRIPT.to_string()
            }
        };
        if text.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "No speech recognized in audio".to_string(),
            ));
        }
        info!(chars = text.chars().count(), "Audio transcribed");
        Ok(Transcription {
            text,
            language,
            confidence: REPORTED_CONFIDENCE,
        })
    }

    /// Falls back to the default language when detection is unavailable or fails.
    pub async fn detect_language(&self, audio: &Path) -> String {
        let Some(transcriber) = &self.transcriber else {
            return DEFAULT_LANGUAGE.to_string();
        };
        match transcriber.detect_language(audio).await {
            Ok(language) => language,
            Err(e) => {
                warn!(error = %e, "Language detection failed, assuming default");
                DEFAULT_LANGUAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl Transcriber for Echo {
        async fn transcribe(&self, _audio: &Path, language: &str) -> ServiceResult<String> {
            Ok(format!("{}:{}", language, self.0))
        }

        async fn detect_language(&self, _audio: &Path) -> ServiceResult<String> {
            Err(ServiceError::Api {
                service: SERVICE,
                status: 500,
                message: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_demo_transcript() {
        let svc = TranscriptionService::new(None);
        let result = svc.transcribe(Path::new("a.webm"), None).await.unwrap();
        assert_eq!(result.text, DEMO_TRANSCRIPT);
        assert_eq!(result.language, "ja");
        assert_eq!(result.confidence, 0.95);
        assert_eq!(svc.detect_language(Path::new("a.webm")).await, "ja");
    }

    #[tokio::test]
    async fn test_transcriber_receives_language() {
        let svc = TranscriptionService::new(Some(Arc::new(Echo("hello"))));
        let result = svc.transcribe(Path::new("a.wav"), Some("en")).await.unwrap();
        assert_eq!(result.text, "en:hello");
    }

    struct Silent;

    #[async_trait]
    impl Transcriber for Silent {
        async fn transcribe(&self, _audio: &Path, _language: &str) -> ServiceResult<String> {
            Ok(String::new())
        }

        async fn detect_language(&self, _audio: &Path) -> ServiceResult<String> {
            Ok("en".to_string())
        }
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let svc = TranscriptionService::new(Some(Arc::new(Silent)));
        assert!(matches!(
            svc.transcribe(Path::new("a.wav"), None).await,
            Err(ServiceError::InvalidRequest(_))
        ));
        assert_eq!(svc.detect_language(Path::new("a.wav")).await, "en");
    }

    #[tokio::test]
    async fn test_detection_failure_falls_back() {
        let svc = TranscriptionService::new(Some(Arc::new(Echo("x"))));
        assert_eq!(svc.detect_language(Path::new("a.wav")).await, "ja");
    }

    #[test]
    fn test_language_code() {
        assert_eq!(language_code("Japanese"), "ja");
        assert_eq!(language_code("fr"), "fr");
    }
}
