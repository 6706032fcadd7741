//! Decoding input bytes into an immutable [`SourceImage`].

use std::io::Cursor;
use std::sync::Arc;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader};

use crate::types::{Dimensions, PipelineError, RgbaImage};

/// Decode raw image bytes (PNG, JPEG, BMP, WebP), upright.
///
/// An EXIF orientation tag is applied, so a rotated phone photo comes out
/// with the dimensions it is displayed at.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    decode_oriented(bytes).map(|(image, _)| image)
}

/// Like [`decode`], also returning the orientation that was applied.
pub(crate) fn decode_oriented(
    bytes: &[u8],
) -> Result<(DynamicImage, Orientation), PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .into_decoder()?;
    // Unreadable EXIF is treated as absent.
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)?;
    if orientation != Orientation::NoTransforms {
        tracing::debug!(?orientation, "applying exif orientation");
        image.apply_orientation(orientation);
    }
    Ok((image, orientation))
}

/// Where a [`SourceImage`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Picked from the local filesystem or an in-memory buffer.
    Picked,
    /// Read back from the blob cache under this key.
    Cached(String),
    /// Fetched from a remote URL.
    Url(String),
    /// Returned by the staging endpoint and normalized.
    Staged,
}

/// Decoded pixels plus where they came from.
///
/// The raster is shared and never mutated; a new pick or a new staging
/// result produces a new `SourceImage` rather than editing this one.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: Arc<RgbaImage>,
    origin: SourceOrigin,
}

impl SourceImage {
    /// Decode `bytes` into a source image.
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn decode(bytes: &[u8], origin: SourceOrigin) -> Result<Self, PipelineError> {
        let pixels = decode(bytes)?.into_rgba8();
        tracing::debug!(
            width = pixels.width(),
            height = pixels.height(),
            ?origin,
            "decoded source image"
        );
        Ok(Self::from_raster(pixels, origin))
    }

    /// Wrap an already decoded raster.
    #[must_use]
    pub fn from_raster(pixels: RgbaImage, origin: SourceOrigin) -> Self {
        Self {
            pixels: Arc::new(pixels),
            origin,
        }
    }

    /// The decoded pixels.
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Natural dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.pixels.width(), self.pixels.height())
    }

    /// Width divided by height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.dimensions().aspect_ratio()
    }

    /// Where these pixels came from.
    #[must_use]
    pub const fn origin(&self) -> &SourceOrigin {
        &self.origin
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, rotated_jpeg_bytes};

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let result = SourceImage::decode(b"definitely not an image", SourceOrigin::Picked);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn decode_reports_natural_dimensions() {
        let bytes = png_bytes(30, 20, [10, 20, 30, 255]);
        let source = SourceImage::decode(&bytes, SourceOrigin::Cached("k".into())).unwrap();
        assert_eq!(source.dimensions(), Dimensions::new(30, 20));
        assert!((source.aspect_ratio() - 1.5).abs() < f64::EPSILON);
        assert_eq!(source.origin(), &SourceOrigin::Cached("k".into()));
    }

    #[test]
    fn clones_share_pixels() {
        let source = SourceImage::from_raster(RgbaImage::new(2, 2), SourceOrigin::Picked);
        let copy = source.clone();
        assert!(std::ptr::eq(source.pixels(), copy.pixels()));
    }

    #[test]
    fn exif_rotation_is_applied() {
        let bytes = rotated_jpeg_bytes(300, 200, 6);
        let (image, orientation) = decode_oriented(&bytes).unwrap();
        assert_eq!(orientation, Orientation::Rotate90);
        assert_eq!((image.width(), image.height()), (200, 300));

        let source = SourceImage::decode(&bytes, SourceOrigin::Picked).unwrap();
        assert_eq!(source.dimensions(), Dimensions::new(200, 300));
    }

    #[test]
    fn untagged_images_are_left_alone() {
        let (image, orientation) = decode_oriented(&png_bytes(30, 20, [0, 0, 0, 255])).unwrap();
        assert_eq!(orientation, Orientation::NoTransforms);
        assert_eq!((image.width(), image.height()), (30, 20));
    }
}
