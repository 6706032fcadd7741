//! Placement math for drawing a source onto the fixed-ratio canvas.
//!
//! Everything here is plain `f64` arithmetic with no raster access, so
//! the layout rules can be tested without decoding a single pixel.

use crate::types::Dimensions;
use crate::view::ViewTransform;

/// Fraction of the canvas height a source occupies at zoom 1.
pub const FIT_HEIGHT_FRACTION: f64 = 0.92;

/// Tolerance used when deciding whether a placement lands on whole pixels.
const ALIGN_EPSILON: f64 = 1e-6;

/// Axis-aligned destination rectangle in canvas pixels.
///
/// `x`/`y` are the top-left corner and may be negative (the source then
/// overflows the canvas and is clipped).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Drawn width.
    pub width: f64,
    /// Drawn height.
    pub height: f64,
}

impl Placement {
    /// Centre a `width`×`height` rectangle on `(cx, cy)`.
    #[must_use]
    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Whether drawing `source` here is a whole-pixel copy with no scaling.
    ///
    /// Such placements are blitted instead of resampled, which keeps
    /// normalization idempotent.
    #[must_use]
    pub fn is_pixel_aligned(&self, source: Dimensions) -> bool {
        let whole = |v: f64| (v - v.round()).abs() < ALIGN_EPSILON;
        whole(self.x)
            && whole(self.y)
            && (self.width - f64::from(source.width)).abs() < ALIGN_EPSILON
            && (self.height - f64::from(source.height)).abs() < ALIGN_EPSILON
    }
}

/// Scale `dims` to fit inside a `max`×`max` box, never enlarging.
///
/// The scale is `min(max / w, max / h)` and each axis is rounded half away
/// from zero. Axes never collapse below one pixel.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn fit_within(dims: Dimensions, max: u32) -> Dimensions {
    if dims.fits_within(max) || dims.width == 0 || dims.height == 0 {
        return dims;
    }
    let max = f64::from(max);
    let ratio = (max / f64::from(dims.width)).min(max / f64::from(dims.height));
    let scale = |v: u32| ((f64::from(v) * ratio).round() as u32).max(1);
    Dimensions::new(scale(dims.width), scale(dims.height))
}

/// Where the framed compositor draws `source` for a given view.
///
/// At zoom 1 the source is 92% of the canvas height tall, its width
/// following the source aspect ratio, centred on the canvas. Zoom
/// multiplies both axes; offsets move the centre.
#[must_use]
pub fn framed_placement(source: Dimensions, canvas: Dimensions, view: ViewTransform) -> Placement {
    let canvas_w = f64::from(canvas.width);
    let canvas_h = f64::from(canvas.height);
    let fit_h = canvas_h * FIT_HEIGHT_FRACTION;
    let fit_w = fit_h * source.aspect_ratio();
    Placement::centered(
        canvas_w / 2.0 + view.offset_x,
        canvas_h / 2.0 + view.offset_y,
        fit_w * view.zoom,
        fit_h * view.zoom,
    )
}

/// Contain-fit `source` into `bounds`, centred on `(cx, cy)`.
#[must_use]
pub fn contain_in(source: Dimensions, bounds_w: f64, bounds_h: f64, cx: f64, cy: f64) -> Placement {
    let sw = f64::from(source.width);
    let sh = f64::from(source.height);
    let scale = (bounds_w / sw).min(bounds_h / sh);
    Placement::centered(cx, cy, sw * scale, sh * scale)
}

/// Letterbox `source` into the whole canvas, centred.
#[must_use]
pub fn contain_placement(source: Dimensions, canvas: Dimensions) -> Placement {
    let w = f64::from(canvas.width);
    let h = f64::from(canvas.height);
    contain_in(source, w, h, w / 2.0, h / 2.0)
}

/// Scale `source` to cover `bounds` entirely (centre crop), times `factor`.
#[must_use]
pub fn cover_in(source: Dimensions, bounds_w: f64, bounds_h: f64, factor: f64) -> Placement {
    let sw = f64::from(source.width);
    let sh = f64::from(source.height);
    let scale = (bounds_w / sw).max(bounds_h / sh) * factor;
    Placement::centered(bounds_w / 2.0, bounds_h / 2.0, sw * scale, sh * scale)
}
