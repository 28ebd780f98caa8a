//! Video encoding and the avatar generation pipeline

pub mod encoder;
pub mod pipeline;

pub use encoder::{EncoderError, FfmpegEncoder, FrameSink, VideoEncoder};
pub use pipeline::{
    frame_count, AvatarPipeline, GenerationOutcome, MuxOutcome, PipelineConfig, PipelineError,
};
