//! Mimic Media Processing Library
//!
//! Media validation, reference-image preparation, audio probing, frame
//! synthesis, and the avatar generation pipeline with its task tracker.

pub mod metadata;
pub mod tracker;
pub mod validator;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "audio")]
pub mod audio;

#[cfg(feature = "video")]
pub mod video;

// Re-export commonly used types
pub use metadata::{AudioMetadata, ImageMetadata};
pub use tracker::{GenerationTaskTracker, WriteOutcome};
pub use validator::{MediaValidator, ValidationError};

#[cfg(feature = "image")]
pub use self::image::{
    check_face, downscale_to_width, ExternalFaceDetector, FaceCheck, FaceDetector,
    ImageProcessor, ReferenceImageReport, ReferenceImageValidator, ZoomAnimator,
};

#[cfg(feature = "audio")]
pub use audio::{AudioProbe, FfprobeAudioProbe, ProbeError, VoiceSampleValidator};

#[cfg(feature = "video")]
pub use video::{
    AvatarPipeline, EncoderError, FfmpegEncoder, FrameSink, GenerationOutcome, MuxOutcome,
    PipelineConfig, PipelineError, VideoEncoder,
};
