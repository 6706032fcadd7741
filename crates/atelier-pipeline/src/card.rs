//! Framed "card" layout for single-image posts.
//!
//! The artwork sits on a card inside a safe margin, over a blurred,
//! solid, averaged or gradient backdrop. The card can carry a rounded
//! frame with an optional hairline border, a soft drop shadow, a tilt
//! and a zoom. All of it renders onto the same 1080×1350 canvas as the
//! carousel slides.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tiny_skia::{
    FillRule, GradientStop, LinearGradient, Mask, Paint, Path, PathBuilder, Pixmap, Point, Rect,
    SpreadMode, Stroke, Transform,
};

use crate::blur;
use crate::compose::Composition;
use crate::decode::SourceImage;
use crate::geometry::{self, Placement};
use crate::raster;
use crate::types::{CANVAS, Dimensions, PipelineError, Quality, Rgb, RgbaImage};

/// Standard deviation of the backdrop blur, in canvas pixels.
const BACKDROP_SIGMA: f32 = 25.0;

/// The backdrop is blurred at this fraction of canvas resolution.
const BACKDROP_DOWNSCALE: u32 = 4;

/// How much larger than "cover" the backdrop image is drawn.
const BACKDROP_OVERSCAN: f64 = 1.2;

/// Side of the thumbnail averaged for [`Background::Average`].
const AVERAGE_SAMPLE: u32 = 12;

/// Shadow opacity (0.18 of black).
const SHADOW_ALPHA: f32 = 0.18;

/// Shadow blur radius; the Gaussian sigma is half of this.
const SHADOW_BLUR: f32 = 24.0;

/// Downward shadow offset in canvas pixels.
const SHADOW_OFFSET_Y: i32 = 8;

/// Cubic control-point distance for a quarter circle.
const KAPPA: f32 = 0.552_284_75;

/// What fills the canvas behind the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Background {
    /// The artwork itself, scaled past cover and heavily blurred.
    Blur,
    /// A flat colour.
    Solid {
        /// Fill colour.
        color: Rgb,
    },
    /// The artwork's mean colour.
    Average,
    /// Vertical two-stop gradient.
    Gradient {
        /// Colour at the top edge.
        top: Rgb,
        /// Colour at the bottom edge.
        bottom: Rgb,
    },
}

/// Shape of the card inside the safe area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardAspect {
    /// Fill the whole safe area.
    #[default]
    Post,
    /// Follow the artwork's aspect ratio.
    Image,
}

/// Rounded frame drawn around the artwork.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame fill colour.
    pub color: Rgb,
    /// Gap between the frame edge and the artwork.
    pub padding: f32,
    /// Corner radius.
    pub radius: f32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            padding: 44.0,
            radius: 28.0,
        }
    }
}

/// Hairline border around the frame (or around the bare image).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Border {
    /// Stroke width.
    pub width: f32,
    /// Stroke colour. Ignored without a frame, where the border is white.
    pub color: Rgb,
}

impl Default for Border {
    fn default() -> Self {
        Self {
            width: 1.0,
            color: Rgb([0xe5, 0xe7, 0xeb]),
        }
    }
}

/// Everything [`compose_card`] can vary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardOptions {
    /// Canvas backdrop.
    pub background: Background,
    /// Optional rounded frame.
    pub frame: Option<Frame>,
    /// Optional border.
    pub border: Option<Border>,
    /// Gap around the artwork when there is no frame.
    pub image_padding: f32,
    /// Clear margin between the card and the canvas edge.
    pub safe_margin: f32,
    /// Draw a soft drop shadow under the card.
    pub shadow: bool,
    /// Clockwise rotation in degrees.
    pub tilt_degrees: f32,
    /// Card scale factor.
    pub zoom: f32,
    /// Card shape.
    pub card_aspect: CardAspect,
    /// Vertical bias of the artwork inside the card, `-1` (top) to `1`
    /// (bottom).
    pub image_offset_y: f32,
    /// JPEG quality when the card is encoded.
    pub quality: Quality,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            background: Background::Blur,
            frame: Some(Frame::default()),
            border: None,
            image_padding: 20.0,
            safe_margin: 60.0,
            shadow: true,
            tilt_degrees: 0.0,
            zoom: 1.0,
            card_aspect: CardAspect::Post,
            image_offset_y: 0.0,
            quality: Quality::from_fraction(0.9),
        }
    }
}

/// Render `source` as a card post.
///
/// # Errors
///
/// Returns [`PipelineError::Allocation`] if the safe margin, padding or
/// zoom leave no room for the card.
pub fn compose_card(source: &SourceImage, options: &CardOptions) -> Result<Composition, PipelineError> {
    tracing::debug!(
        background = ?options.background,
        aspect = ?options.card_aspect,
        "composing card"
    );
    let mut canvas = backdrop(source, options.background)?;
    let card = render_card(source, options)?;
    let transform = card_transform(&card, options);

    if options.shadow {
        draw_shadow(&mut canvas, &card, transform)?;
    }
    canvas.draw_pixmap(0, 0, card.as_ref(), &raster::bicubic(), transform, None);

    Composition::from_pixmap(&canvas)
}

fn backdrop(source: &SourceImage, background: Background) -> Result<Pixmap, PipelineError> {
    match background {
        Background::Blur => blurred_backdrop(source),
        Background::Solid { color } => raster::filled_pixmap(CANVAS, color),
        Background::Average => raster::filled_pixmap(CANVAS, average_color(source.pixels())),
        Background::Gradient { top, bottom } => gradient_backdrop(top, bottom),
    }
}

fn blurred_backdrop(source: &SourceImage) -> Result<Pixmap, PipelineError> {
    let small = Dimensions::new(
        CANVAS.width.div_ceil(BACKDROP_DOWNSCALE),
        CANVAS.height.div_ceil(BACKDROP_DOWNSCALE),
    );
    let mut layer = raster::filled_pixmap(small, Rgb::WHITE)?;
    let cover = geometry::cover_in(
        source.dimensions(),
        f64::from(small.width),
        f64::from(small.height),
        BACKDROP_OVERSCAN,
    );
    raster::draw_placed(&mut layer, source.pixels(), cover)?;

    #[allow(clippy::cast_precision_loss)]
    let sigma = BACKDROP_SIGMA / BACKDROP_DOWNSCALE as f32;
    let blurred = blur::gaussian_blur_rgba(&raster::from_pixmap(&layer)?, sigma);

    let mut canvas = raster::filled_pixmap(CANVAS, Rgb::WHITE)?;
    let full = Placement {
        x: 0.0,
        y: 0.0,
        width: f64::from(CANVAS.width),
        height: f64::from(CANVAS.height),
    };
    raster::draw_placed(&mut canvas, &blurred, full)?;
    Ok(canvas)
}

fn gradient_backdrop(top: Rgb, bottom: Rgb) -> Result<Pixmap, PipelineError> {
    let mut canvas = raster::filled_pixmap(CANVAS, top)?;
    #[allow(clippy::cast_precision_loss)]
    let (w, h) = (CANVAS.width as f32, CANVAS.height as f32);
    let shader = LinearGradient::new(
        Point::from_xy(0.0, 0.0),
        Point::from_xy(0.0, h),
        vec![
            GradientStop::new(0.0, top.to_skia()),
            GradientStop::new(1.0, bottom.to_skia()),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    );
    // Degenerate gradients yield `None`; the fill above stands in.
    if let (Some(shader), Some(rect)) = (shader, Rect::from_xywh(0.0, 0.0, w, h)) {
        let paint = Paint {
            shader,
            ..Paint::default()
        };
        canvas.fill_rect(rect, &paint, Transform::identity(), None);
    }
    Ok(canvas)
}

/// Mean colour of `image`, sampled from a 12×12 thumbnail.
#[must_use]
pub fn average_color(image: &RgbaImage) -> Rgb {
    let thumb = image::imageops::resize(
        image,
        AVERAGE_SAMPLE,
        AVERAGE_SAMPLE,
        image::imageops::FilterType::Triangle,
    );
    let mut sums = [0u64; 3];
    for px in thumb.pixels() {
        for (sum, &c) in sums.iter_mut().zip(&px.0[..3]) {
            *sum += u64::from(c);
        }
    }
    let n = u64::from(AVERAGE_SAMPLE * AVERAGE_SAMPLE);
    Rgb(sums.map(|s| u8::try_from((s + n / 2) / n).unwrap_or(u8::MAX)))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn render_card(source: &SourceImage, options: &CardOptions) -> Result<Pixmap, PipelineError> {
    let margin = f64::from(options.safe_margin);
    let area_w = f64::from(CANVAS.width) - margin * 2.0;
    let area_h = f64::from(CANVAS.height) - margin * 2.0;

    let (card_w, card_h) = match options.card_aspect {
        CardAspect::Post => (area_w, area_h),
        CardAspect::Image => {
            let fit = geometry::contain_in(source.dimensions(), area_w, area_h, 0.0, 0.0);
            (fit.width, fit.height)
        }
    };
    let card_dims = Dimensions::new(card_w.round().max(0.0) as u32, card_h.round().max(0.0) as u32);
    let mut card = Pixmap::new(card_dims.width, card_dims.height)
        .ok_or(PipelineError::Allocation(card_dims))?;
    let (cw, ch) = (card_dims.width as f32, card_dims.height as f32);

    match options.frame {
        Some(frame) => {
            let outline = rounded_rect(0.0, 0.0, cw, ch, frame.radius);
            if let Some(path) = &outline {
                card.fill_path(
                    path,
                    &solid_paint(frame.color),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
                if let Some(border) = options.border.filter(|b| b.width > 0.0) {
                    let stroke = Stroke {
                        width: border.width,
                        ..Stroke::default()
                    };
                    card.stroke_path(
                        path,
                        &solid_paint(border.color),
                        &stroke,
                        Transform::identity(),
                        None,
                    );
                }
            }

            let clip = outline.as_ref().and_then(|path| {
                let mut mask = Mask::new(card_dims.width, card_dims.height)?;
                mask.fill_path(path, FillRule::Winding, true, Transform::identity());
                Some(mask)
            });
            if let Some(placement) =
                inset_placement(source.dimensions(), card_dims, frame.padding, options.image_offset_y)
            {
                raster::draw_resampled(&mut card, source.pixels(), placement, clip.as_ref())?;
            }
        }
        None => {
            if let Some(placement) = inset_placement(
                source.dimensions(),
                card_dims,
                options.image_padding,
                options.image_offset_y,
            ) {
                if let Some(border) = options.border.filter(|b| b.width > 0.0) {
                    let bw = f64::from(border.width);
                    let rect = Rect::from_xywh(
                        (placement.x - bw) as f32,
                        (placement.y - bw) as f32,
                        (placement.width + bw * 2.0) as f32,
                        (placement.height + bw * 2.0) as f32,
                    );
                    if let Some(rect) = rect {
                        card.fill_rect(rect, &solid_paint(Rgb::WHITE), Transform::identity(), None);
                    }
                }
                raster::draw_resampled(&mut card, source.pixels(), placement, None)?;
            }
        }
    }
    Ok(card)
}

/// Contain-fit the artwork inside `card` minus `padding`, biased
/// vertically by `offset_y` times half the spare height.
fn inset_placement(
    source: Dimensions,
    card: Dimensions,
    padding: f32,
    offset_y: f32,
) -> Option<Placement> {
    let padding = f64::from(padding);
    let inner_w = f64::from(card.width) - padding * 2.0;
    let inner_h = f64::from(card.height) - padding * 2.0;
    if inner_w <= 0.0 || inner_h <= 0.0 {
        return None;
    }
    let fit = geometry::contain_in(source, inner_w, inner_h, 0.0, 0.0);
    let slack_y = (inner_h - fit.height).max(0.0);
    let bias = f64::from(offset_y.clamp(-1.0, 1.0));
    Some(Placement {
        x: (f64::from(card.width) - fit.width) / 2.0,
        y: padding + (inner_h - fit.height) / 2.0 + slack_y * bias / 2.0,
        width: fit.width,
        height: fit.height,
    })
}

#[allow(clippy::cast_precision_loss)]
fn card_transform(card: &Pixmap, options: &CardOptions) -> Transform {
    let zoom = if options.zoom.is_finite() && options.zoom > 0.0 {
        options.zoom
    } else {
        1.0
    };
    let (cw, ch) = (card.width() as f32, card.height() as f32);
    let draw_w = (cw * zoom).round();
    let draw_h = (ch * zoom).round();
    Transform::from_translate(CANVAS.width as f32 / 2.0, CANVAS.height as f32 / 2.0)
        .pre_concat(Transform::from_rotate(options.tilt_degrees))
        .pre_translate(-draw_w / 2.0, -draw_h / 2.0)
        .pre_scale(draw_w / cw, draw_h / ch)
}

fn draw_shadow(canvas: &mut Pixmap, card: &Pixmap, transform: Transform) -> Result<(), PipelineError> {
    let mut layer = Pixmap::new(CANVAS.width, CANVAS.height).ok_or(PipelineError::Allocation(CANVAS))?;
    layer.draw_pixmap(0, 0, card.as_ref(), &raster::bicubic(), transform, None);

    let coverage = GrayImage::from_fn(CANVAS.width, CANVAS.height, |x, y| {
        let i = ((y * CANVAS.width + x) * 4 + 3) as usize;
        image::Luma([layer.data().get(i).copied().unwrap_or(0)])
    });
    let soft = blur::gaussian_blur(&coverage, SHADOW_BLUR / 2.0);

    let shadow = RgbaImage::from_fn(CANVAS.width, CANVAS.height, |x, y| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let a = (f32::from(soft.get_pixel(x, y).0[0]) * SHADOW_ALPHA).round() as u8;
        image::Rgba([0, 0, 0, a])
    });
    let shadow = raster::to_pixmap(&shadow)?;
    canvas.draw_pixmap(
        0,
        SHADOW_OFFSET_Y,
        shadow.as_ref(),
        &tiny_skia::PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    Ok(())
}

fn solid_paint(color: Rgb) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

/// A rectangle with circular corners of `radius`, clamped to half the
/// shorter side.
fn rounded_rect(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    let r = radius.max(0.0).min(w / 2.0).min(h / 2.0);
    let k = r * KAPPA;
    let (right, bottom) = (x + w, y + h);

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
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

    fn plain(background: Background) -> CardOptions {
        CardOptions {
            background,
            shadow: false,
            ..CardOptions::default()
        }
    }

    fn close(a: [u8; 4], b: [u8; 3], tol: u8) -> bool {
        a[..3].iter().zip(b).all(|(&x, y)| x.abs_diff(y) <= tol)
    }

    #[test]
    fn defaults() {
        let d = CardOptions::default();
        assert_eq!(d.background, Background::Blur);
        assert_eq!(d.frame, Some(Frame::default()));
        assert!(d.border.is_none());
        assert!(d.shadow);
        assert_eq!(d.quality.get(), 90);
        assert_eq!(Border::default().color, Rgb([0xe5, 0xe7, 0xeb]));
    }

    #[test]
    fn card_is_canvas_sized() {
        let out = compose_card(&solid(300, 200, [20, 40, 60, 255]), &CardOptions::default()).unwrap();
        assert_eq!(out.dimensions(), CANVAS);
    }

    #[test]
    fn solid_background_fills_margin() {
        let color = Rgb([10, 120, 30]);
        let out = compose_card(&solid(100, 100, [0, 0, 0, 255]), &plain(Background::Solid { color }))
            .unwrap();
        assert!(close(out.raster().get_pixel(20, 20).0, color.0, 0));
        assert!(close(out.raster().get_pixel(1060, 1330).0, color.0, 0));
    }

    #[test]
    fn frame_surrounds_artwork() {
        let out = compose_card(
            &solid(100, 100, [0, 0, 0, 255]),
            &plain(Background::Solid { color: Rgb([200, 0, 0]) }),
        )
        .unwrap();
        let r = out.raster();
        // Card spans 60..1020 horizontally; padding 44 of white frame.
        assert!(close(r.get_pixel(80, 675).0, [255, 255, 255], 2));
        // Square artwork is 872 wide centred: 104..976.
        assert!(close(r.get_pixel(540, 675).0, [0, 0, 0], 8));
        // Rounded corner shows the background.
        assert!(close(r.get_pixel(61, 61).0, [200, 0, 0], 8));
    }

    #[test]
    fn average_background_uses_mean_colour() {
        let img = RgbaImage::from_fn(24, 24, |x, _| {
            if x < 12 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([200, 100, 50, 255])
            }
        });
        let avg = average_color(&img);
        for (got, want) in avg.0.iter().zip([100u8, 50, 25]) {
            assert!(got.abs_diff(want) <= 2, "{avg:?}");
        }
    }

    #[test]
    fn gradient_runs_top_to_bottom() {
        let options = CardOptions {
            frame: None,
            ..plain(Background::Gradient {
                top: Rgb::BLACK,
                bottom: Rgb::WHITE,
            })
        };
        let out = compose_card(&solid(10, 10, [0, 255, 0, 255]), &options).unwrap();
        let top = out.raster().get_pixel(5, 5).0[0];
        let bottom = out.raster().get_pixel(5, 1345).0[0];
        assert!(top < 10 && bottom > 245, "{top} {bottom}");
    }

    #[test]
    fn image_aspect_card_hugs_artwork() {
        let options = CardOptions {
            card_aspect: CardAspect::Image,
            frame: None,
            image_padding: 0.0,
            ..plain(Background::Solid { color: Rgb::WHITE })
        };
        let out = compose_card(&solid(200, 100, [0, 0, 0, 255]), &options).unwrap();
        // 960x480 card centred: rows 435..915.
        assert!(close(out.raster().get_pixel(540, 420).0, [255, 255, 255], 0));
        assert!(close(out.raster().get_pixel(540, 675).0, [0, 0, 0], 8));
    }

    #[test]
    fn shadow_darkens_below_card() {
        let color = Rgb::WHITE;
        let with = compose_card(
            &solid(100, 100, [0, 0, 0, 255]),
            &CardOptions {
                shadow: true,
                ..plain(Background::Solid { color })
            },
        )
        .unwrap();
        // Just below the card's bottom edge (1290).
        let px = with.raster().get_pixel(540, 1300).0;
        assert!(px[0] < 255, "{px:?}");
    }

    #[test]
    fn offset_moves_artwork_up() {
        let base = CardOptions {
            frame: None,
            image_padding: 0.0,
            ..plain(Background::Solid { color: Rgb::WHITE })
        };
        let up = CardOptions {
            image_offset_y: -1.0,
            ..base
        };
        // 200x100 in a 960x1230 card: 480 tall, slack 750.
        let out = compose_card(&solid(200, 100, [0, 0, 0, 255]), &up).unwrap();
        assert!(close(out.raster().get_pixel(540, 80).0, [0, 0, 0], 8));
        let centred = compose_card(&solid(200, 100, [0, 0, 0, 255]), &base).unwrap();
        assert!(close(centred.raster().get_pixel(540, 80).0, [255, 255, 255], 0));
    }

    #[test]
    fn excessive_margin_is_an_error() {
        let options = CardOptions {
            safe_margin: 600.0,
            ..CardOptions::default()
        };
        assert!(matches!(
            compose_card(&solid(10, 10, [0, 0, 0, 255]), &options),
            Err(PipelineError::Allocation(_))
        ));
    }

    #[test]
    fn rounded_rect_clamps_radius() {
        let path = rounded_rect(0.0, 0.0, 10.0, 4.0, 50.0).unwrap();
        let b = path.bounds();
        assert!((b.width() - 10.0).abs() < 1e-3);
        assert!((b.height() - 4.0).abs() < 1e-3);
    }
}
