use super::face::{check_face, FaceCheck, FaceDetector};
use super::processor::ImageProcessor;
use crate::metadata::ImageMetadata;
use crate::validator::ValidationError;
use mimic_core::constants::{MAX_IMAGE_DIMENSION, MIN_IMAGE_DIMENSION};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// What an accepted reference image looks like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceImageReport {
    pub metadata: ImageMetadata,
    pub face: FaceCheck,
}

/// Checks that an uploaded photo is usable as an avatar reference:
/// decodable, within the dimension bounds, and showing a face.
#[derive(Clone)]
pub struct ReferenceImageValidator {
    detector: Arc<dyn FaceDetector>,
    min_dimension: u32,
    max_dimension: u32,
}

impl ReferenceImageValidator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            detector,
            min_dimension: MIN_IMAGE_DIMENSION,
            max_dimension: MAX_IMAGE_DIMENSION,
        }
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }

    /// Dimension checks only, for an already decoded image.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), ValidationError> {
        if width < self.min_dimension || height < self.min_dimension {
            return Err(ValidationError::ImageTooSmall {
                width,
                height,
                min: self.min_dimension,
            });
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ValidationError::ImageTooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }
        Ok(())
    }

    /// Decode, bound-check, then run face detection. The first failing check wins.
    #[tracing::instrument(skip(self, path), fields(image = %path.display()))]
    pub async fn validate(&self, path: &Path) -> Result<ReferenceImageReport, ValidationError> {
        let (_, metadata) = ImageProcessor::open(path)
            .await
            .map_err(|e| ValidationError::UnreadableImage(format!("{:#}", e)))?;

        self.check_dimensions(metadata.width, metadata.height)?;

        let face = check_face(self.detector.as_ref(), path).await;
        if !face.face_present() {
            return Err(ValidationError::NoFaceDetected);
        }

        tracing::debug!(
            width = metadata.width,
            height = metadata.height,
            format = %metadata.format,
            "Reference image accepted"
        );
        Ok(ReferenceImageReport { metadata, face })
    }
}
