//! Reference image handling: decoding, face detection, preprocessing, and
//! the frame animation applied during synthesis.

pub mod animation;
pub mod face;
pub mod preprocess;
pub mod processor;
pub mod reference;

pub use animation::{zoom_factor, ZoomAnimator};
pub use face::{check_face, DetectionParams, DetectorError, ExternalFaceDetector, FaceCheck, FaceDetector};
pub use preprocess::{crop_to_face, downscale_to_width, face_crop_region};
pub use processor::ImageProcessor;
pub use reference::{ReferenceImageReport, ReferenceImageValidator};
