//! Shared types for the atelier composition pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hold rasters without
/// depending on `image` directly.
pub use image::RgbaImage;

/// Width of the fixed-ratio output canvas in pixels.
pub const CANVAS_WIDTH: u32 = 1080;

/// Height of the fixed-ratio output canvas in pixels.
pub const CANVAS_HEIGHT: u32 = 1350;

/// The mandatory 4:5 output canvas.
pub const CANVAS: Dimensions = Dimensions {
    width: CANVAS_WIDTH,
    height: CANVAS_HEIGHT,
};

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    #[must_use]
    pub fn aspect_ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Whether both axes are at most `max` pixels.
    #[must_use]
    pub const fn fits_within(self, max: u32) -> bool {
        self.width <= max && self.height <= max
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// JPEG encoder quality on the 1..=100 scale.
///
/// Callers usually think in the browser's `0.0..=1.0` fraction, so
/// [`Quality::from_fraction`] is the common constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(u8);

impl Quality {
    /// Quality used for uploaded originals.
    pub const UPLOAD: Self = Self(82);

    /// Quality used for composed carousel slides.
    pub const OUTPUT: Self = Self(92);

    /// Build from a `0.0..=1.0` fraction, clamping into `1..=100`.
    ///
    /// Non-finite input falls back to [`Quality::OUTPUT`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_fraction(fraction: f32) -> Self {
        if !fraction.is_finite() {
            return Self::OUTPUT;
        }
        let scaled = (fraction * 100.0).round().clamp(1.0, 100.0);
        Self(scaled as u8)
    }

    /// The encoder value on the 1..=100 scale.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::OUTPUT
    }
}

/// An opaque sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Pure white, the canvas background.
    pub const WHITE: Self = Self([255, 255, 255]);

    /// Pure black.
    pub const BLACK: Self = Self([0, 0, 0]);

    /// Red channel.
    #[must_use]
    pub const fn r(self) -> u8 {
        self.0[0]
    }

    /// Green channel.
    #[must_use]
    pub const fn g(self) -> u8 {
        self.0[1]
    }

    /// Blue channel.
    #[must_use]
    pub const fn b(self) -> u8 {
        self.0[2]
    }

    pub(crate) fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r(), self.g(), self.b(), 255)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r(), self.g(), self.b())
    }
}

impl FromStr for Rgb {
    type Err = PipelineError;

    /// Parse a CSS hex colour (`"#e5e7eb"` or short form `" #fff "`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| PipelineError::InvalidColor(s.to_owned()))?;
        match hex.len() {
            3 => {
                // Short form: #rgb → #rrggbb
                let mut rgb = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let n = ch
                        .to_digit(16)
                        .ok_or_else(|| PipelineError::InvalidColor(s.to_owned()))?;
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        rgb[i] = (n * 17) as u8;
                    }
                }
                Ok(Self(rgb))
            }
            6 => {
                let channel = |range: std::ops::Range<usize>| {
                    hex.get(range)
                        .and_then(|part| u8::from_str_radix(part, 16).ok())
                        .ok_or_else(|| PipelineError::InvalidColor(s.to_owned()))
                };
                Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
            }
            _ => Err(PipelineError::InvalidColor(s.to_owned())),
        }
    }
}

/// Errors that can occur while compressing or composing images.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A composition was requested for a slide that has no base image.
    #[error("no source image")]
    NoSource,

    /// The input was not a usable `data:` URL or base64 payload.
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// A colour string could not be parsed.
    #[error("invalid colour: {0:?}")]
    InvalidColor(String),

    /// Encoding a raster failed.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// A raster of the requested size could not be allocated.
    #[error("cannot allocate a {0} raster")]
    Allocation(Dimensions),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn canvas_is_four_by_five() {
        assert_eq!(CANVAS.width * 5, CANVAS.height * 4);
    }

    #[test]
    fn fits_within_is_inclusive() {
        assert!(Dimensions::new(1400, 1400).fits_within(1400));
        assert!(!Dimensions::new(1401, 10).fits_within(1400));
        assert!(!Dimensions::new(10, 1401).fits_within(1400));
    }

    #[test]
    fn quality_from_fraction_rounds_and_clamps() {
        assert_eq!(Quality::from_fraction(0.82).get(), 82);
        assert_eq!(Quality::from_fraction(0.92).get(), 92);
        assert_eq!(Quality::from_fraction(0.0).get(), 1);
        assert_eq!(Quality::from_fraction(7.0).get(), 100);
        assert_eq!(Quality::from_fraction(f32::NAN), Quality::OUTPUT);
    }

    #[test]
    fn parse_long_and_short_hex() {
        assert_eq!("#e5e7eb".parse::<Rgb>().unwrap(), Rgb([0xe5, 0xe7, 0xeb]));
        assert_eq!(" #fff ".parse::<Rgb>().unwrap(), Rgb::WHITE);
        assert_eq!("#000".parse::<Rgb>().unwrap(), Rgb::BLACK);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "e5e7eb".parse::<Rgb>(),
            Err(PipelineError::InvalidColor(_))
        ));
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
    }

    #[test]
    fn rgb_display_is_lowercase_hex() {
        assert_eq!(Rgb([229, 231, 235]).to_string(), "#e5e7eb");
    }

    #[test]
    fn error_display() {
        assert_eq!(PipelineError::NoSource.to_string(), "no source image");
        assert_eq!(
            PipelineError::Allocation(Dimensions::new(0, 3)).to_string(),
            "cannot allocate a 0x3 raster"
        );
    }
}
