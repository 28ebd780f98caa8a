pub mod conversation;
pub mod image;
pub mod media;
pub mod task;
pub mod voice;

pub use conversation::{ChatMessage, ChatRequest, ChatRole, Conversation};
pub use image::{FaceBox, UploadedImage};
pub use media::MediaKind;
pub use task::{GenerateRequest, GenerationTask, ProcessingStatus, SpeakRequest, TaskStatusView};
pub use voice::{SynthesisRequest, SynthesizedAudio, VoiceClone, VoiceSample};
