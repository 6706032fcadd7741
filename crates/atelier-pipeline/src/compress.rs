//! Bounding and re-encoding uploads before they are cached.
//!
//! Reduces the input so neither axis exceeds `max_dimension`, then
//! re-encodes as JPEG. An upright image that already fits is passed
//! through byte-for-byte: no upscaling and no generational loss. One with
//! an EXIF rotation is always re-encoded upright, since re-encoding drops
//! the tag.
//!
//! If the encoder fails the original bytes are kept, since an oversized
//! upload is still better than none.

use std::fmt;

use image::DynamicImage;
use image::metadata::Orientation;
use serde::{Deserialize, Serialize};

use crate::decode::decode_oriented;
use crate::geometry::fit_within;
use crate::raster::encode_jpeg;
use crate::types::{Dimensions, PipelineError, Quality};

/// Default bound on either axis for uploads.
pub const DEFAULT_MAX_DIMENSION: u32 = 1400;

/// Resampling filter used when shrinking.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Bicubic (Catmull-Rom), matching a browser's "high" smoothing.
    #[default]
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Parameters for [`compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressOptions {
    /// Bound on either axis, in pixels.
    pub max_dimension: u32,
    /// JPEG quality for re-encoded output.
    pub quality: Quality,
    /// Filter used when shrinking.
    pub filter: ResampleFilter,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: Quality::UPLOAD,
            filter: ResampleFilter::default(),
        }
    }
}

/// What [`compress`] did to the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressOutcome {
    /// Already within bounds; bytes are the input.
    Unchanged,
    /// Shrunk and re-encoded as JPEG.
    Reencoded,
    /// Shrinking worked but encoding failed; bytes are the input.
    EncoderFallback,
}

/// Result of [`compress`].
#[derive(Debug, Clone)]
pub struct Compressed {
    /// Bytes to store.
    pub bytes: Vec<u8>,
    /// Dimensions of the image `bytes` decodes to.
    pub dimensions: Dimensions,
    /// Dimensions of the input.
    pub original_dimensions: Dimensions,
    /// What happened.
    pub outcome: CompressOutcome,
}

/// Bound `bytes` to `options.max_dimension` on both axes.
///
/// The scale factor is `min(max / w, max / h)` and output dimensions are
/// rounded half away from zero.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// if the input cannot be decoded. Encoder failures are not errors; see
/// [`CompressOutcome::EncoderFallback`].
pub fn compress(bytes: &[u8], options: &CompressOptions) -> Result<Compressed, PipelineError> {
    compress_with(bytes, options, encode_jpeg)
}

fn compress_with(
    bytes: &[u8],
    options: &CompressOptions,
    encoder: impl FnOnce(&image::RgbaImage, Quality) -> Result<Vec<u8>, PipelineError>,
) -> Result<Compressed, PipelineError> {
    let (decoded, orientation) = decode_oriented(bytes)?;
    let original = Dimensions::new(decoded.width(), decoded.height());
    let target = fit_within(original, options.max_dimension);

    if target == original && orientation == Orientation::NoTransforms {
        tracing::debug!(dimensions = %original, "within bounds, keeping original bytes");
        return Ok(Compressed {
            bytes: bytes.to_vec(),
            dimensions: original,
            original_dimensions: original,
            outcome: CompressOutcome::Unchanged,
        });
    }

    let resized = resize_exact(&decoded, target, options.filter);
    match encoder(&resized, options.quality) {
        Ok(encoded) => {
            tracing::debug!(
                from = %original,
                to = %target,
                bytes_in = bytes.len(),
                bytes_out = encoded.len(),
                "compressed"
            );
            Ok(Compressed {
                bytes: encoded,
                dimensions: target,
                original_dimensions: original,
                outcome: CompressOutcome::Reencoded,
            })
        }
        Err(err) => {
            tracing::warn!(%err, "encoder failed, keeping original bytes");
            Ok(Compressed {
                bytes: bytes.to_vec(),
                dimensions: original,
                original_dimensions: original,
                outcome: CompressOutcome::EncoderFallback,
            })
        }
    }
}

fn resize_exact(
    image: &DynamicImage,
    target: Dimensions,
    filter: ResampleFilter,
) -> image::RgbaImage {
    image::imageops::resize(
        &image.to_rgba8(),
        target.width,
        target.height,
        filter.to_image_filter(),
    )
}
