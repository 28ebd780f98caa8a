use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Axis-aligned face bounding box in source image pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A validated reference image registered in the upload store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedImage {
    pub id: String,
    /// Path the animation reads from: the processed crop when available, else the upload.
    pub path: PathBuf,
    pub original_path: PathBuf,
    pub original_filename: String,
    pub width: u32,
    pub height: u32,
    pub face_detected: bool,
    pub format: String,
    pub face_box: Option<FaceBox>,
    pub processed_size: Option<(u32, u32)>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_box_area() {
        assert_eq!(FaceBox::new(10, 10, 120, 80).area(), 9600);
        assert_eq!(FaceBox::new(0, 0, 0, 80).area(), 0);
    }
}
