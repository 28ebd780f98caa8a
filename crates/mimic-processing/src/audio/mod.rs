//! Audio probing and voice sample validation

pub mod processor;
pub mod validator;

pub use processor::{parse_volume_levels, AudioProbe, FfprobeAudioProbe, ProbeError};
pub use validator::VoiceSampleValidator;

// Re-export metadata types
pub use crate::metadata::AudioMetadata;
