//! Letterboxing an arbitrary image back into the fixed-ratio canvas.
//!
//! The staging endpoint may return any size or aspect ratio. Its result
//! is contain-fitted onto white so slide 2 matches slide 1's canvas.

use crate::compose::Composition;
use crate::data_url;
use crate::decode::{SourceImage, SourceOrigin};
use crate::geometry;
use crate::raster;
use crate::types::{CANVAS, PipelineError, Rgb};

/// Contain-fit `source` into the canvas, centred on white.
///
/// A source that is already exactly canvas sized and opaque is copied
/// pixel-for-pixel, so `normalize` is idempotent.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the source raster is empty.
pub fn normalize(source: &SourceImage) -> Result<Composition, PipelineError> {
    let placement = geometry::contain_placement(source.dimensions(), CANVAS);
    tracing::debug!(
        source = %source.dimensions(),
        width = placement.width,
        height = placement.height,
        "normalizing"
    );
    let mut canvas = raster::filled_pixmap(CANVAS, Rgb::WHITE)?;
    raster::draw_placed(&mut canvas, source.pixels(), placement)?;
    Composition::from_pixmap(&canvas)
}

/// Decode raw bytes and normalize them.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// for unusable bytes.
pub fn normalize_bytes(bytes: &[u8]) -> Result<Composition, PipelineError> {
    normalize(&SourceImage::decode(bytes, SourceOrigin::Staged)?)
}

/// Decode a `data:` URL (or bare base64) and normalize it.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDataUrl`] for a malformed URL, then as
/// [`normalize_bytes`].
pub fn normalize_data_url(url: &str) -> Result<Composition, PipelineError> {
    normalize_bytes(&data_url::decode(url)?.bytes)
}
