//! Mimic Services Library
//!
//! Application services built on the processing crate: the upload store,
//! voice cloning and synthesis, transcription, chat, the render queue, and the
//! [`AvatarService`] that drives them end to end.
//!
//! Every third-party API client sits behind a trait ([`SpeechSynthesizer`],
//! [`Transcriber`], [`ChatModel`]) and each service falls back to a demo mode
//! when its client is absent.

pub mod avatar;
pub mod chat;
pub mod error;
mod http;
pub mod render_queue;
pub mod stt;
pub mod uploads;
pub mod voice;

#[cfg(feature = "cleanup")]
pub mod retention;

// Re-export commonly used types
pub use avatar::{AvatarComponents, AvatarService, ChatTurn, SpeakOutcome, VoiceTurn, VoiceTurnRequest};
pub use chat::{AnthropicClient, ChatModel, ChatReply, ChatService};
pub use error::{ServiceError, ServiceResult};
pub use render_queue::{RenderJob, RenderQueue};
pub use stt::{Transcriber, Transcription, TranscriptionService, WhisperClient};
pub use uploads::UploadService;
pub use voice::{ElevenLabsClient, RemoteVoice, SpeechSynthesizer, VoiceService};

#[cfg(feature = "cleanup")]
pub use retention::{RetentionSweeper, SweepReport};
