use super::processor::AudioProbe;
use crate::metadata::AudioMetadata;
use crate::validator::ValidationError;
use mimic_core::constants::{MAX_VOICE_SAMPLE_SECS, MIN_VOICE_SAMPLE_SECS, SILENCE_THRESHOLD_DBFS};
use std::path::Path;
use std::sync::Arc;

/// Checks a voice sample is long enough to clone from and not silent.
#[derive(Clone)]
pub struct VoiceSampleValidator {
    probe: Arc<dyn AudioProbe>,
}

impl VoiceSampleValidator {
    pub fn new(probe: Arc<dyn AudioProbe>) -> Self {
        Self { probe }
    }

    /// Apply the duration and loudness checks to probed metadata.
    ///
    /// Checks run in order (too short, too long, silent) and the first failure
    /// is returned. A peak level that could not be measured counts as silent.
    pub fn check(metadata: &AudioMetadata) -> Result<(), ValidationError> {
        let duration = metadata.duration_secs;
        if duration < MIN_VOICE_SAMPLE_SECS {
            return Err(ValidationError::AudioTooShort {
                duration_secs: duration,
                min_secs: MIN_VOICE_SAMPLE_SECS,
            });
        }
        if duration > MAX_VOICE_SAMPLE_SECS {
            return Err(ValidationError::AudioTooLong {
                duration_secs: duration,
                max_secs: MAX_VOICE_SAMPLE_SECS,
            });
        }
        match metadata.peak_dbfs {
            Some(peak) if peak >= SILENCE_THRESHOLD_DBFS => Ok(()),
            peak => Err(ValidationError::AudioSilent { peak_dbfs: peak }),
        }
    }

    /// Probe `path` and validate it. Undecodable files are rejected as unreadable.
    #[tracing::instrument(skip(self, path), fields(file = %path.display()))]
    pub async fn validate(&self, path: &Path) -> Result<AudioMetadata, ValidationError> {
        let metadata = self
            .probe
            .probe(path)
            .await
            .map_err(|e| ValidationError::UnreadableAudio(e.to_string()))?;
        Self::check(&metadata)?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ProbeError;
    use async_trait::async_trait;

    fn speech(duration_secs: f64) -> AudioMetadata {
        AudioMetadata {
            peak_dbfs: Some(-3.0),
            mean_dbfs: Some(-20.0),
            ..AudioMetadata::with_duration(duration_secs)
        }
    }

    #[test]
    fn test_duration_boundaries() {
        assert!(VoiceSampleValidator::check(&speech(10.0)).is_ok());
        assert!(matches!(
            VoiceSampleValidator::check(&speech(9.99)),
            Err(ValidationError::AudioTooShort { .. })
        ));
        assert!(VoiceSampleValidator::check(&speech(300.0)).is_ok());
        assert!(matches!(
            VoiceSampleValidator::check(&speech(300.01)),
            Err(ValidationError::AudioTooLong { .. })
        ));
    }

    #[test]
    fn test_silence_threshold() {
        let quiet = AudioMetadata {
            peak_dbfs: Some(-50.5),
            ..AudioMetadata::with_duration(30.0)
        };
        assert!(matches!(
            VoiceSampleValidator::check(&quiet),
            Err(ValidationError::AudioSilent { .. })
        ));

        let at_threshold = AudioMetadata {
            peak_dbfs: Some(-50.0),
            ..AudioMetadata::with_duration(30.0)
        };
        assert!(VoiceSampleValidator::check(&at_threshold).is_ok());

        let unmeasured = AudioMetadata::with_duration(30.0);
        assert!(VoiceSampleValidator::check(&unmeasured).is_err());
    }

    #[test]
    fn test_first_failure_wins() {
        // Both too short and silent: duration is reported.
        let meta = AudioMetadata {
            peak_dbfs: Some(f64::NEG_INFINITY),
            ..AudioMetadata::with_duration(2.0)
        };
        let err = VoiceSampleValidator::check(&meta).unwrap_err();
        assert_eq!(err.to_string(), "Audio too short. Need at least 10 seconds.");
    }

    struct FixedProbe(Option<AudioMetadata>);

    #[async_trait]
    impl AudioProbe for FixedProbe {
        async fn probe(&self, _path: &Path) -> Result<AudioMetadata, ProbeError> {
            self.0.clone().ok_or(ProbeError::NoDuration)
        }
    }

    #[tokio::test]
    async fn test_validate_uses_probe() {
        let ok = VoiceSampleValidator::new(Arc::new(FixedProbe(Some(speech(42.0)))));
        let meta = ok.validate(Path::new("voice.mp3")).await.unwrap();
        assert_eq!(meta.duration_secs, 42.0);

        let broken = VoiceSampleValidator::new(Arc::new(FixedProbe(None)));
        assert!(matches!(
            broken.validate(Path::new("voice.mp3")).await,
            Err(ValidationError::UnreadableAudio(_))
        ));
    }
}
