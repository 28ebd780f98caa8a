//! Image processor - decoding and metadata extraction

use crate::metadata::ImageMetadata;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub struct ImageProcessor;

impl ImageProcessor {
    /// Decode `data`, guessing the format from its magic bytes.
    pub fn decode(data: &[u8]) -> Result<(DynamicImage, ImageMetadata)> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("Failed to read image header")?;
        let format = reader
            .format()
            .map(|f| format!("{:?}", f))
            .unwrap_or_else(|| "unknown".to_string());
        let img = reader.decode().context("Failed to decode image")?;
        let (width, height) = img.dimensions();

        Ok((
            img,
            ImageMetadata {
                width,
                height,
                format,
                size_bytes: Some(data.len() as u64),
            },
        ))
    }

    /// Read and decode an image file on the blocking pool.
    pub async fn open(path: &Path) -> Result<(DynamicImage, ImageMetadata)> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            Self::decode(&data)
        })
        .await
        .context("Image decode task panicked")?
    }

    /// Encode `img` as PNG at `path`, creating parent directories.
    pub async fn save_png(img: DynamicImage, path: &Path) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            img.save_with_format(&path, image::ImageFormat::Png)
                .with_context(|| format!("Failed to write {}", path.display()))
        })
        .await
        .context("Image encode task panicked")?
    }
}
