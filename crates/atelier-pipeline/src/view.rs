//! Per-slide zoom and pan parameters.
//!
//! Values are clamped when they enter a [`ViewTransform`], so the
//! compositor itself never sees an out-of-range zoom.

use serde::{Deserialize, Serialize};

/// Smallest zoom a slider can select.
pub const ZOOM_MIN: f64 = 0.6;

/// Largest zoom a slider can select.
pub const ZOOM_MAX: f64 = 1.6;

/// Offset bound, in canvas pixels, on either side of centre.
pub const OFFSET_LIMIT: f64 = 300.0;

/// Zoom and pan applied when composing one slide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    /// Scale factor relative to the 92% fit height.
    pub zoom: f64,
    /// Horizontal shift of the source centre in canvas pixels.
    pub offset_x: f64,
    /// Vertical shift of the source centre in canvas pixels.
    pub offset_y: f64,
}

impl ViewTransform {
    /// Zoom 1, no offsets.
    pub const IDENTITY: Self = Self {
        zoom: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Replace the zoom, clamped to `[ZOOM_MIN, ZOOM_MAX]`.
    ///
    /// A non-finite value leaves the current zoom in place.
    #[must_use]
    pub fn with_zoom(self, zoom: f64) -> Self {
        if !zoom.is_finite() {
            return self;
        }
        Self {
            zoom: zoom.clamp(ZOOM_MIN, ZOOM_MAX),
            ..self
        }
    }

    /// Replace the horizontal offset, clamped to `±OFFSET_LIMIT`.
    #[must_use]
    pub fn with_offset_x(self, offset_x: f64) -> Self {
        if !offset_x.is_finite() {
            return self;
        }
        Self {
            offset_x: offset_x.clamp(-OFFSET_LIMIT, OFFSET_LIMIT),
            ..self
        }
    }

    /// Replace the vertical offset, clamped to `±OFFSET_LIMIT`.
    #[must_use]
    pub fn with_offset_y(self, offset_y: f64) -> Self {
        if !offset_y.is_finite() {
            return self;
        }
        Self {
            offset_y: offset_y.clamp(-OFFSET_LIMIT, OFFSET_LIMIT),
            ..self
        }
    }

    /// Whether this is the identity view.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        assert!(ViewTransform::default().is_identity());
    }

    #[test]
    fn zoom_is_clamped() {
        assert!((ViewTransform::IDENTITY.with_zoom(0.1).zoom - ZOOM_MIN).abs() < f64::EPSILON);
        assert!((ViewTransform::IDENTITY.with_zoom(9.0).zoom - ZOOM_MAX).abs() < f64::EPSILON);
        assert!((ViewTransform::IDENTITY.with_zoom(1.25).zoom - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn offsets_are_clamped() {
        let v = ViewTransform::IDENTITY
            .with_offset_x(-1000.0)
            .with_offset_y(450.0);
        assert!((v.offset_x + OFFSET_LIMIT).abs() < f64::EPSILON);
        assert!((v.offset_y - OFFSET_LIMIT).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_input_keeps_current_value() {
        let v = ViewTransform::IDENTITY.with_zoom(1.2);
        assert_eq!(v.with_zoom(f64::NAN), v);
        assert_eq!(v.with_offset_x(f64::INFINITY), v);
        assert_eq!(v.with_offset_y(f64::NEG_INFINITY), v);
    }
}
