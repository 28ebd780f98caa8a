//! Periodic "breathing" zoom applied to each synthesized frame.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use mimic_core::constants::{FRAME_RATE, ZOOM_AMPLITUDE, ZOOM_FREQUENCY_HZ};
use std::f64::consts::PI;

/// Zoom factor for frame `index`: `1 + amplitude * sin(2π f t) * expression_scale`
/// with `t = index / frame_rate`.
pub fn zoom_factor(index: u64, frame_rate: u32, amplitude: f64, expression_scale: f64) -> f64 {
    if frame_rate == 0 {
        return 1.0;
    }
    let t = index as f64 / frame_rate as f64;
    1.0 + amplitude * (2.0 * PI * ZOOM_FREQUENCY_HZ * t).sin() * expression_scale
}

/// Renders frames of the breathing animation from a still reference frame.
#[derive(Debug, Clone, Copy)]
pub struct ZoomAnimator {
    frame_rate: u32,
    amplitude: f64,
    expression_scale: f64,
}

impl ZoomAnimator {
    pub fn new(frame_rate: u32, amplitude: f64, expression_scale: f64) -> Self {
        Self {
            frame_rate,
            amplitude,
            expression_scale,
        }
    }

    pub fn scale_at(&self, index: u64) -> f64 {
        zoom_factor(index, self.frame_rate, self.amplitude, self.expression_scale)
    }

    /// Frame `index`: `base` zoomed isotropically about its center.
    pub fn render(&self, base: &RgbImage, index: u64) -> RgbImage {
        let scale = self.scale_at(index) as f32;
        if scale == 1.0 {
            return base.clone();
        }

        let cx = base.width() as f32 / 2.0;
        let cy = base.height() as f32 / 2.0;
        let projection = Projection::translate(cx, cy)
            * Projection::scale(scale, scale)
            * Projection::translate(-cx, -cy);

        warp(base, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]))
    }
}

impl Default for ZoomAnimator {
    fn default() -> Self {
        Self::new(FRAME_RATE, ZOOM_AMPLITUDE, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        })
    }

    #[test]
    fn test_zoom_factor_follows_sine() {
        assert_eq!(zoom_factor(0, 25, 0.005, 1.0), 1.0);
        // Quarter period of a 0.5 Hz wave is 0.5s, frame 12.5; frame 25 is the half period.
        assert!((zoom_factor(25, 25, 0.005, 1.0) - 1.0).abs() < 1e-12);
        let peak = zoom_factor(12, 25, 0.005, 1.0);
        assert!(peak > 1.0049 && peak <= 1.005);
        let trough = zoom_factor(37, 25, 0.005, 1.0);
        assert!(trough < 0.9951);
    }

    #[test]
    fn test_expression_scale_multiplies_amplitude() {
        let base = zoom_factor(10, 25, 0.005, 1.0) - 1.0;
        let doubled = zoom_factor(10, 25, 0.005, 2.0) - 1.0;
        assert!((doubled - 2.0 * base).abs() < 1e-12);
    }

    #[test]
    fn test_first_frame_is_unchanged() {
        let base = gradient(64, 48);
        let frame = ZoomAnimator::default().render(&base, 0);
        assert_eq!(frame, base);
    }

    #[test]
    fn test_static_image_still_animates() {
        let base = gradient(200, 160);
        let animator = ZoomAnimator::new(25, 0.05, 1.0);
        let frame = animator.render(&base, 12);
        assert_eq!(frame.dimensions(), base.dimensions());
        assert_ne!(frame, base);
    }

    #[test]
    fn test_zero_amplitude_is_static() {
        let base = gradient(32, 32);
        let animator = ZoomAnimator::new(25, 0.0, 2.0);
        for index in [0, 7, 12, 40] {
            assert_eq!(animator.render(&base, index), base);
        }
    }
}
