use mimic_core::{AppError, MediaKind};
use std::path::Path;

/// Rejections of an uploaded media file.
///
/// Display strings are the caller-facing messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large. Maximum size is {:.1}MB", *max as f64 / (1024.0 * 1024.0))]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file type. Allowed: {}", allowed.join(", "))]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Empty file")]
    EmptyFile,

    #[error("Image too small. Minimum {min}x{min} pixels required.")]
    ImageTooSmall { width: u32, height: u32, min: u32 },

    #[error("Image too large. Maximum {max}x{max} pixels.")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    #[error("No face detected in image. Please use a clear front-facing photo.")]
    NoFaceDetected,

    #[error("Failed to process image: {0}")]
    UnreadableImage(String),

    #[error("Audio too short. Need at least {min_secs:.0} seconds.")]
    AudioTooShort { duration_secs: f64, min_secs: f64 },

    #[error("Audio too long. Maximum {} minutes.", max_secs / 60.0)]
    AudioTooLong { duration_secs: f64, max_secs: f64 },

    #[error("Audio appears to be silent or too quiet.")]
    AudioSilent { peak_dbfs: Option<f64> },

    #[error("Failed to process audio: {0}")]
    UnreadableAudio(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Upload file validator
///
/// Checks size and extension before anything is written to disk.
#[derive(Debug, Clone)]
pub struct MediaValidator {
    max_file_size: usize,
    allowed_extensions: Vec<String>,
}

impl MediaValidator {
    pub fn new(max_file_size: usize, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
        }
    }

    /// Validator accepting the extensions of `kind` up to `max_file_size` bytes.
    pub fn for_kind(kind: MediaKind, max_file_size: usize) -> Self {
        Self::new(
            max_file_size,
            kind.allowed_extensions()
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        )
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate file extension (case-insensitive)
    pub fn validate_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| ValidationError::InvalidExtension {
                extension: String::new(),
                allowed: self.allowed_extensions.clone(),
            })?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(())
    }

    /// Validate extension first, then size.
    pub fn validate_all(&self, filename: &str, file_size: usize) -> Result<(), ValidationError> {
        if filename.trim().is_empty() {
            return Err(ValidationError::InvalidFilename(filename.to_string()));
        }
        self.validate_extension(filename)?;
        self.validate_file_size(file_size)?;
        Ok(())
    }
}

/// Lowercase extension of `filename` with a leading dot, if it is one `kind` accepts.
pub fn accepted_extension(kind: MediaKind, filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();
    kind.allowed_extensions()
        .contains(&ext.as_str())
        .then(|| format!(".{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_validator() -> MediaValidator {
        MediaValidator::for_kind(MediaKind::Image, 5 * 1024 * 1024)
    }

    #[test]
    fn test_validate_file_size_ok() {
        assert!(image_validator().validate_file_size(512 * 1024).is_ok());
    }

    #[test]
    fn test_validate_file_size_too_large_message() {
        let err = image_validator()
            .validate_file_size(6 * 1024 * 1024)
            .unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size is 5.0MB");
    }

    #[test]
    fn test_validate_file_size_empty() {
        assert!(matches!(
            image_validator().validate_file_size(0),
            Err(ValidationError::EmptyFile)
        ));
    }

    #[test]
    fn test_validate_extension_case_insensitive() {
        let validator = image_validator();
        assert!(validator.validate_extension("face.JPG").is_ok());
        assert!(validator.validate_extension("face.jpeg").is_ok());
        assert!(validator.validate_extension("face.png").is_ok());
    }

    #[test]
    fn test_validate_extension_lists_allowed() {
        let err = image_validator()
            .validate_extension("face.gif")
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid file type. Allowed: jpg, jpeg, png");
    }

    #[test]
    fn test_validate_extension_missing() {
        assert!(image_validator().validate_extension("noextension").is_err());
    }

    #[test]
    fn test_voice_validator() {
        let validator = MediaValidator::for_kind(MediaKind::Voice, 10 * 1024 * 1024);
        assert!(validator.validate_all("sample.m4a", 1024).is_ok());
        assert!(validator.validate_all("sample.flac", 1024).is_err());
        assert!(validator.validate_all("sample.ogg", 11 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_accepted_extension() {
        assert_eq!(
            accepted_extension(MediaKind::Image, "me.JPEG"),
            Some(".jpeg".to_string())
        );
        assert_eq!(accepted_extension(MediaKind::Image, "me.bmp"), None);
        assert_eq!(accepted_extension(MediaKind::Voice, "clip"), None);
    }

    #[test]
    fn test_audio_messages() {
        let short = ValidationError::AudioTooShort {
            duration_secs: 9.99,
            min_secs: 10.0,
        };
        assert_eq!(short.to_string(), "Audio too short. Need at least 10 seconds.");
        let long = ValidationError::AudioTooLong {
            duration_secs: 300.01,
            max_secs: 300.0,
        };
        assert_eq!(long.to_string(), "Audio too long. Maximum 5 minutes.");
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = ValidationError::NoFaceDetected.into();
        assert!(matches!(err, AppError::Validation(ref m) if m.to_lowercase().contains("no face detected")));

        let err: AppError = ValidationError::FileTooLarge { size: 2, max: 1 }.into();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }
}
