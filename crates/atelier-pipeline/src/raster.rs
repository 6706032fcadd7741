//! Conversions between `image` rasters and `tiny-skia` pixmaps, plus
//! JPEG/PNG encoding of finished rasters.
//!
//! `tiny-skia` stores premultiplied RGBA while `image` stores straight
//! RGBA, so every crossing goes through [`to_pixmap`] / [`from_pixmap`].

use std::io::Cursor;

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use tiny_skia::{FilterQuality, IntSize, Mask, Pixmap, PixmapPaint, Transform};

use crate::geometry::Placement;
use crate::types::{Dimensions, PipelineError, Quality, Rgb, RgbaImage};

/// Allocate a pixmap filled with an opaque colour.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] for zero-sized or oversized
/// dimensions.
pub fn filled_pixmap(dims: Dimensions, fill: Rgb) -> Result<Pixmap, PipelineError> {
    let mut pixmap =
        Pixmap::new(dims.width, dims.height).ok_or(PipelineError::Allocation(dims))?;
    pixmap.fill(fill.to_skia());
    Ok(pixmap)
}

/// Premultiply a straight-alpha raster into a pixmap.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] for an empty raster.
pub fn to_pixmap(image: &RgbaImage) -> Result<Pixmap, PipelineError> {
    let dims = Dimensions::new(image.width(), image.height());
    let size = IntSize::from_wh(dims.width, dims.height).ok_or(PipelineError::Allocation(dims))?;
    let mut data = image.as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = mul_div_255(u16::from(*c), a);
        }
    }
    Pixmap::from_vec(data, size).ok_or(PipelineError::Allocation(dims))
}

/// Un-premultiply a pixmap back into a straight-alpha raster.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the pixel buffer does not
/// match the pixmap size (never the case for pixmaps built here).
pub fn from_pixmap(pixmap: &Pixmap) -> Result<RgbaImage, PipelineError> {
    let dims = Dimensions::new(pixmap.width(), pixmap.height());
    let mut data = pixmap.data().to_vec();
    for px in data.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        match a {
            255 => {}
            0 => px[..3].fill(0),
            _ => {
                for c in &mut px[..3] {
                    let straight = (u16::from(*c) * 255 + a / 2) / a;
                    *c = u8::try_from(straight.min(255)).unwrap_or(u8::MAX);
                }
            }
        }
    }
    RgbaImage::from_raw(dims.width, dims.height, data).ok_or(PipelineError::Allocation(dims))
}

#[allow(clippy::cast_possible_truncation)]
const fn mul_div_255(c: u16, a: u16) -> u8 {
    // Exact rounding of c * a / 255 for 8-bit inputs.
    let t = c * a + 128;
    ((t + (t >> 8)) >> 8) as u8
}

/// Draw `source` into `canvas` at `placement`.
///
/// Whole-pixel, unscaled placements of an opaque source are copied
/// byte-for-byte; everything else is resampled with bicubic filtering.
/// Anything outside the canvas is clipped.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] for an empty source.
pub fn draw_placed(
    canvas: &mut Pixmap,
    source: &RgbaImage,
    placement: Placement,
) -> Result<(), PipelineError> {
    let dims = Dimensions::new(source.width(), source.height());
    if placement.is_pixel_aligned(dims) && is_opaque(source) {
        #[allow(clippy::cast_possible_truncation)]
        blit_opaque(canvas, source, placement.x.round() as i64, placement.y.round() as i64);
        return Ok(());
    }

    draw_resampled(canvas, source, placement, None)
}

/// Draw `source` into `canvas` at `placement` with bicubic filtering,
/// optionally clipped by `mask`.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] for an empty source.
pub fn draw_resampled(
    canvas: &mut Pixmap,
    source: &RgbaImage,
    placement: Placement,
    mask: Option<&Mask>,
) -> Result<(), PipelineError> {
    let dims = Dimensions::new(source.width(), source.height());
    let pixmap = to_pixmap(source)?;
    canvas.draw_pixmap(
        0,
        0,
        pixmap.as_ref(),
        &bicubic(),
        placement_transform(placement, dims),
        mask,
    );
    Ok(())
}

/// Paint for smooth, high-quality image scaling.
#[must_use]
pub fn bicubic() -> PixmapPaint {
    PixmapPaint {
        quality: FilterQuality::Bicubic,
        ..PixmapPaint::default()
    }
}

/// The transform mapping source pixel space onto `placement`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn placement_transform(placement: Placement, source: Dimensions) -> Transform {
    let sx = placement.width / f64::from(source.width);
    let sy = placement.height / f64::from(source.height);
    Transform::from_row(
        sx as f32,
        0.0,
        0.0,
        sy as f32,
        placement.x as f32,
        placement.y as f32,
    )
}

fn is_opaque(image: &RgbaImage) -> bool {
    image.pixels().all(|p| p.0[3] == 255)
}

fn blit_opaque(canvas: &mut Pixmap, source: &RgbaImage, left: i64, top: i64) {
    let canvas_w = i64::from(canvas.width());
    let canvas_h = i64::from(canvas.height());
    let src_w = i64::from(source.width());
    let src_h = i64::from(source.height());

    let x0 = left.max(0);
    let x1 = (left + src_w).min(canvas_w);
    let y0 = top.max(0);
    let y1 = (top + src_h).min(canvas_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let src = source.as_raw();
    let dst = canvas.data_mut();
    let span = usize::try_from((x1 - x0) * 4).unwrap_or(0);
    for y in y0..y1 {
        let src_start = usize::try_from(((y - top) * src_w + (x0 - left)) * 4).unwrap_or(0);
        let dst_start = usize::try_from((y * canvas_w + x0) * 4).unwrap_or(0);
        if let (Some(from), Some(to)) = (
            src.get(src_start..src_start + span),
            dst.get_mut(dst_start..dst_start + span),
        ) {
            to.copy_from_slice(from);
        }
    }
}

/// Flatten onto white and encode as baseline JPEG.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if the encoder fails.
pub fn encode_jpeg(image: &RgbaImage, quality: Quality) -> Result<Vec<u8>, PipelineError> {
    let rgb = flatten_onto_white(image);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.get())
        .encode_image(&rgb)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Encode as PNG, keeping alpha.
///
/// # Errors
///
/// Returns [`PipelineError::Encode`] if the encoder fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    PngEncoder::new(&mut buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

fn flatten_onto_white(image: &RgbaImage) -> image::RgbImage {
    image::RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let a = u16::from(a);
        let over = |c: u8| mul_div_255(u16::from(c), a) + mul_div_255(255, 255 - a);
        image::Rgb([over(r), over(g), over(b)])
    })
}
