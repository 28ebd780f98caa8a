//! Upload Store: validated reference images and voice samples.

use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use mimic_core::constants::PROCESSED_FACE_SIZE;
use mimic_core::{FaceBox, MediaKind, UploadedImage, VoiceSample};
use mimic_processing::image::{crop_to_face, ImageProcessor};
use mimic_processing::validator::accepted_extension;
use mimic_processing::{MediaValidator, ReferenceImageValidator, VoiceSampleValidator};
use mimic_storage::{LocalFileStore, MemoryStore, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct UploadService {
    files: LocalFileStore,
    images: Arc<dyn Store<UploadedImage>>,
    samples: Arc<dyn Store<VoiceSample>>,
    image_files: MediaValidator,
    voice_files: MediaValidator,
    reference: ReferenceImageValidator,
    voice: VoiceSampleValidator,
}

impl UploadService {
    pub fn new(
        files: LocalFileStore,
        reference: ReferenceImageValidator,
        voice: VoiceSampleValidator,
        max_image_bytes: usize,
        max_voice_bytes: usize,
    ) -> Self {
        Self {
            files,
            images: Arc::new(MemoryStore::new()),
            samples: Arc::new(MemoryStore::new()),
            image_files: MediaValidator::for_kind(MediaKind::Image, max_image_bytes),
            voice_files: MediaValidator::for_kind(MediaKind::Voice, max_voice_bytes),
            reference,
            voice,
        }
    }

    /// Use `images` as the image registry instead of the in-memory default.
    pub fn with_image_store(mut self, images: Arc<dyn Store<UploadedImage>>) -> Self {
        self.images = images;
        self
    }

    pub fn files(&self) -> &LocalFileStore {
        &self.files
    }

    /// Validate, store and preprocess a reference image.
    ///
    /// Rejected uploads leave nothing behind on disk.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn upload_image(&self, data: &[u8], filename: &str) -> ServiceResult<UploadedImage> {
        self.image_files.validate_all(filename, data.len())?;

        let id = Uuid::new_v4().to_string();
        let ext = accepted_extension(MediaKind::Image, filename)
            .unwrap_or_else(|| MediaKind::Image.default_extension().to_string());
        let original_path = self.files.save(MediaKind::Image, &id, &ext, data).await?;

        let report = match self.reference.validate(&original_path).await {
            Ok(report) => report,
            Err(e) => {
                self.discard(&original_path).await;
                return Err(e.into());
            }
        };

        let face_box = report.face.largest_face();
        let (path, processed_size) = match face_box {
            Some(face) => match self.preprocess(&id, &original_path, face).await {
                Ok(processed) => (processed, Some((PROCESSED_FACE_SIZE, PROCESSED_FACE_SIZE))),
                Err(e) => {
                    warn!(image_id = %id, error = %e, "Preprocessing failed, using original image");
                    (original_path.clone(), None)
                }
            },
            None => (original_path.clone(), None),
        };

        let image = UploadedImage {
            id: id.clone(),
            path,
            original_path,
            original_filename: filename.to_string(),
            width: report.metadata.width,
            height: report.metadata.height,
            face_detected: report.face.face_present(),
            format: report.metadata.format,
            face_box,
            processed_size,
            created_at: Utc::now(),
        };
        self.images.put(&id, image.clone()).await?;

        info!(
            image_id = %id,
            width = image.width,
            height = image.height,
            processed = image.processed_size.is_some(),
            "Reference image registered"
        );
        Ok(image)
    }

    /// `{upload_dir}/image/processed/{id}_processed.png`
    pub fn processed_path(&self, image_id: &str) -> PathBuf {
        self.files
            .dir(MediaKind::Image)
            .join("processed")
            .join(format!("{}_processed.png", image_id))
    }

    async fn preprocess(
        &self,
        image_id: &str,
        original: &Path,
        face: FaceBox,
    ) -> anyhow::Result<PathBuf> {
        let (img, _) = ImageProcessor::open(original).await?;
        let cropped = crop_to_face(&img, face);
        let processed = self.processed_path(image_id);
        ImageProcessor::save_png(cropped, &processed).await?;
        Ok(processed)
    }

    pub async fn image(&self, image_id: &str) -> ServiceResult<Option<UploadedImage>> {
        Ok(self.images.get(image_id).await?)
    }

    /// Path the animation should read for `image_id`.
    pub async fn image_path(&self, image_id: &str) -> ServiceResult<PathBuf> {
        self.image(image_id)
            .await?
            .map(|image| image.path)
            .ok_or_else(|| ServiceError::NotFound("Reference image".to_string()))
    }

    /// Forget an image and delete its files.
    pub async fn purge_image(&self, image_id: &str) -> ServiceResult<bool> {
        let Some(image) = self.images.delete(image_id).await? else {
            return Ok(false);
        };
        self.discard(&image.original_path).await;
        if image.path != image.original_path {
            self.discard(&image.path).await;
        }
        info!(image_id = %image_id, "Reference image purged");
        Ok(true)
    }

    /// Validate and store a voice sample for cloning.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn upload_voice_sample(&self, data: &[u8], filename: &str) -> ServiceResult<VoiceSample> {
        self.voice_files.validate_all(filename, data.len())?;

        let id = Uuid::new_v4().to_string();
        let ext = accepted_extension(MediaKind::Voice, filename)
            .unwrap_or_else(|| MediaKind::Voice.default_extension().to_string());
        let path = self.files.save(MediaKind::Voice, &id, &ext, data).await?;

        let metadata = match self.voice.validate(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.discard(&path).await;
                return Err(e.into());
            }
        };

        let sample = VoiceSample {
            id: id.clone(),
            path,
            original_filename: filename.to_string(),
            duration_secs: metadata.duration_secs,
            created_at: Utc::now(),
        };
        self.samples.put(&id, sample.clone()).await?;
        info!(voice_id = %id, duration_secs = sample.duration_secs, "Voice sample registered");
        Ok(sample)
    }

    pub async fn voice_sample(&self, voice_id: &str) -> ServiceResult<Option<VoiceSample>> {
        Ok(self.samples.get(voice_id).await?)
    }

    /// Save an audio clip that is transcribed rather than cloned; only type and size are checked.
    pub async fn save_voice_message(&self, data: &[u8], filename: &str) -> ServiceResult<PathBuf> {
        self.voice_files.validate_all(filename, data.len())?;
        let id = Uuid::new_v4().to_string();
        let ext = accepted_extension(MediaKind::Voice, filename)
            .unwrap_or_else(|| MediaKind::Voice.default_extension().to_string());
        Ok(self.files.save(MediaKind::Voice, &id, &ext, data).await?)
    }

    /// Drop image and voice sample records created before `cutoff`.
    pub async fn evict_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<usize> {
        let mut evicted = 0;
        for (id, image) in self.images.scan().await? {
            if image.created_at < cutoff && self.images.delete(&id).await?.is_some() {
                evicted += 1;
            }
        }
        for (id, sample) in self.samples.scan().await? {
            if sample.created_at < cutoff && self.samples.delete(&id).await?.is_some() {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.files.delete(path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete upload");
        }
    }
}
