//! Fixed parameters of the avatar pipeline and media validators.

/// Output video frame rate.
pub const FRAME_RATE: u32 = 25;

/// Reference frames wider than this are downscaled before animation.
pub const MAX_FRAME_WIDTH: u32 = 720;

/// Peak relative zoom of the breathing animation at expression scale 1.0.
pub const ZOOM_AMPLITUDE: f64 = 0.005;

/// Frequency of the breathing animation in hertz.
pub const ZOOM_FREQUENCY_HZ: f64 = 0.5;

/// Progress reached when frame synthesis finishes; the rest belongs to muxing.
pub const SYNTHESIS_PROGRESS_CEILING: u8 = 80;

pub const MIN_EXPRESSION_SCALE: f64 = 0.5;
pub const MAX_EXPRESSION_SCALE: f64 = 2.0;

// Voice sample bounds
pub const MIN_VOICE_SAMPLE_SECS: f64 = 10.0;
pub const MAX_VOICE_SAMPLE_SECS: f64 = 300.0;
pub const SILENCE_THRESHOLD_DBFS: f64 = -50.0;

// Reference image bounds
pub const MIN_IMAGE_DIMENSION: u32 = 256;
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// Side length of the square face crop produced by preprocessing.
pub const PROCESSED_FACE_SIZE: u32 = 512;

/// Padding added on each side of a face box, as a fraction of its longer side.
pub const FACE_PADDING_RATIO: f64 = 0.5;

/// Prior messages sent to the language model with each turn.
pub const CHAT_HISTORY_WINDOW: usize = 10;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VOICE_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];

pub const MAX_VIDEO_FILE_SIZE_MB: usize = 100;
