//! The fixed-ratio compositor.
//!
//! Draws a source onto a white 1080×1350 canvas at 92% of the canvas
//! height, scaled by the view's zoom and shifted by its offsets. Whatever
//! falls outside the canvas is clipped.

use crate::data_url;
use crate::decode::SourceImage;
use crate::geometry;
use crate::raster;
use crate::types::{CANVAS, Dimensions, PipelineError, Quality, Rgb, RgbaImage};
use crate::view::ViewTransform;

/// A finished 1080×1350 raster.
///
/// Only this crate can construct one, so holding a `Composition` is
/// proof of the canvas size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    raster: RgbaImage,
}

impl Composition {
    pub(crate) fn from_pixmap(pixmap: &tiny_skia::Pixmap) -> Result<Self, PipelineError> {
        let raster = raster::from_pixmap(pixmap)?;
        debug_assert_eq!(
            Dimensions::new(raster.width(), raster.height()),
            CANVAS,
            "compositions are always canvas sized"
        );
        Ok(Self { raster })
    }

    /// The composed pixels.
    #[must_use]
    pub const fn raster(&self) -> &RgbaImage {
        &self.raster
    }

    /// Take ownership of the composed pixels.
    #[must_use]
    pub fn into_raster(self) -> RgbaImage {
        self.raster
    }

    /// Always [`CANVAS`].
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.raster.width(), self.raster.height())
    }

    /// Encode as JPEG.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the encoder fails.
    pub fn encode_jpeg(&self, quality: Quality) -> Result<Vec<u8>, PipelineError> {
        raster::encode_jpeg(&self.raster, quality)
    }

    /// Encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the encoder fails.
    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        raster::encode_png(&self.raster)
    }

    /// Encode as a `data:image/jpeg;base64,...` URL.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if the encoder fails.
    pub fn to_data_url(&self, quality: Quality) -> Result<String, PipelineError> {
        Ok(data_url::encode("image/jpeg", &self.encode_jpeg(quality)?))
    }
}

/// Compose `source` onto the canvas under `view`.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the source raster is empty.
pub fn compose(source: &SourceImage, view: ViewTransform) -> Result<Composition, PipelineError> {
    let placement = geometry::framed_placement(source.dimensions(), CANVAS, view);
    tracing::debug!(
        zoom = view.zoom,
        offset_x = view.offset_x,
        offset_y = view.offset_y,
        width = placement.width,
        height = placement.height,
        "composing"
    );
    let mut canvas = raster::filled_pixmap(CANVAS, Rgb::WHITE)?;
    raster::draw_placed(&mut canvas, source.pixels(), placement)?;
    Composition::from_pixmap(&canvas)
}

/// Compose an optional source, reporting a missing one as an error.
///
/// # Errors
///
/// Returns [`PipelineError::NoSource`] when `source` is `None`, otherwise
/// whatever [`compose`] returns.
pub fn compose_slide(
    source: Option<&SourceImage>,
    view: ViewTransform,
) -> Result<Composition, PipelineError> {
    compose(source.ok_or(PipelineError::NoSource)?, view)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::SourceOrigin;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> SourceImage {
        SourceImage::from_raster(RgbaImage::from_pixel(w, h, Rgba(rgba)), SourceOrigin::Picked)
    }

    fn is_white(px: [u8; 4]) -> bool {
        px == [255, 255, 255, 255]
    }

    fn is_dark(px: [u8; 4]) -> bool {
        px[..3].iter().all(|&c| c < 8) && px[3] == 255
    }

    #[test]
    fn output_is_always_canvas_sized() {
        for (w, h) in [(1, 1), (3000, 200), (200, 3000), (1080, 1350)] {
            let out = compose(&solid(w, h, [0, 0, 0, 255]), ViewTransform::IDENTITY).unwrap();
            assert_eq!(out.dimensions(), CANVAS);
        }
    }

    #[test]
    fn identity_leaves_white_bands_above_and_below() {
        let out = compose(&solid(50, 100, [200, 0, 0, 255]), ViewTransform::IDENTITY).unwrap();
        let r = out.raster();
        assert!(is_white(r.get_pixel(540, 10).0));
        assert!(is_white(r.get_pixel(540, 1340).0));
        assert!(is_white(r.get_pixel(5, 675).0));
        let centre = r.get_pixel(540, 675).0;
        assert!(centre[0] > 190 && centre[1] < 10, "{centre:?}");
    }

    #[test]
    fn offsets_move_the_image() {
        let view = ViewTransform::IDENTITY.with_offset_x(300.0);
        let out = compose(&solid(100, 100, [0, 0, 0, 255]), view).unwrap();
        // Square is 1242 wide centred at 840: left edge at 219.
        assert!(is_white(out.raster().get_pixel(200, 675).0));
        assert!(is_dark(out.raster().get_pixel(260, 675).0));
    }

    #[test]
    fn zoomed_out_shrinks_the_image() {
        let view = ViewTransform::IDENTITY.with_zoom(0.6);
        let out = compose(&solid(100, 100, [0, 0, 0, 255]), view).unwrap();
        // 1242 * 0.6 = 745.2 tall, top at ~302.
        assert!(is_white(out.raster().get_pixel(540, 290).0));
        assert!(is_dark(out.raster().get_pixel(540, 320).0));
    }

    #[test]
    fn transparent_source_shows_white() {
        let out = compose(&solid(50, 50, [0, 0, 0, 0]), ViewTransform::IDENTITY).unwrap();
        assert!(is_white(out.raster().get_pixel(540, 675).0));
    }

    #[test]
    fn missing_source_is_reported() {
        assert!(matches!(
            compose_slide(None, ViewTransform::IDENTITY),
            Err(PipelineError::NoSource)
        ));
    }

    #[test]
    fn data_url_is_jpeg() {
        let out = compose(&solid(4, 4, [1, 2, 3, 255]), ViewTransform::IDENTITY).unwrap();
        let url = out.to_data_url(Quality::OUTPUT).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
