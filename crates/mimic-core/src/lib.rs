//! Mimic Core Library
//!
//! This crate provides the domain models, error types, configuration, and shared
//! constants used by every Mimic component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ChatMessage, ChatRequest, ChatRole, Conversation, FaceBox, GenerateRequest, GenerationTask,
    MediaKind, ProcessingStatus, SpeakRequest, SynthesisRequest, SynthesizedAudio, TaskStatusView,
    UploadedImage, VoiceClone, VoiceSample,
};
