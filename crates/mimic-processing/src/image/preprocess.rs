//! Geometry helpers applied to reference images before animation.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use mimic_core::constants::{FACE_PADDING_RATIO, PROCESSED_FACE_SIZE};
use mimic_core::FaceBox;

/// Region around `face` padded by half its longest side, clamped to the image.
///
/// Returns `(x, y, width, height)`. The result is never empty as long as the
/// face box overlaps the image.
pub fn face_crop_region(face: FaceBox, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
    let padding = (face.width.max(face.height) as f64 * FACE_PADDING_RATIO) as u32;

    let x1 = face.x.saturating_sub(padding).min(image_width.saturating_sub(1));
    let y1 = face.y.saturating_sub(padding).min(image_height.saturating_sub(1));
    let x2 = face
        .x
        .saturating_add(face.width)
        .saturating_add(padding)
        .min(image_width);
    let y2 = face
        .y
        .saturating_add(face.height)
        .saturating_add(padding)
        .min(image_height);

    (x1, y1, x2.saturating_sub(x1).max(1), y2.saturating_sub(y1).max(1))
}

/// Crop `img` to the padded face region and resize it to the square processed size.
pub fn crop_to_face(img: &DynamicImage, face: FaceBox) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (x, y, w, h) = face_crop_region(face, width, height);
    img.crop_imm(x, y, w, h).resize_exact(
        PROCESSED_FACE_SIZE,
        PROCESSED_FACE_SIZE,
        FilterType::Triangle,
    )
}

/// Downscale to `max_width` keeping the aspect ratio; smaller images are returned as-is.
pub fn downscale_to_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width || max_width == 0 {
        return img;
    }
    let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
    img.resize_exact(max_width, new_height, FilterType::Triangle)
}
