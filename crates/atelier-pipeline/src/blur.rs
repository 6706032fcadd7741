//! Gaussian blur for card backdrops and drop shadows.
//!
//! Thin wrappers over [`imageproc::filter::gaussian_blur_f32`] that treat
//! a non-positive or non-finite sigma as "no blur" instead of panicking.

use image::GrayImage;

use crate::types::RgbaImage;

/// Blur a single-channel image (used for shadow masks).
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || !sigma.is_finite() {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Blur every channel of an RGBA image, alpha included.
#[must_use = "returns the blurred RGBA image"]
pub fn gaussian_blur_rgba(image: &RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 || !sigma.is_finite() {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}
