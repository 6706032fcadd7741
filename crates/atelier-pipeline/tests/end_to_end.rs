//! Integration test: upload bytes through compress, compose and normalize.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use atelier_pipeline::{
    CANVAS, CompressOptions, CompressOutcome, Dimensions, Quality, SourceImage, SourceOrigin,
    ViewTransform, compose, compress, normalize, normalize_data_url,
};
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

const PAINT: [u8; 3] = [180, 60, 40];

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([PAINT[0], PAINT[1], PAINT[2], 255]));
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

fn near(px: [u8; 4], rgb: [u8; 3], tol: u8) -> bool {
    px[..3].iter().zip(rgb).all(|(&a, b)| a.abs_diff(b) <= tol)
}

#[test]
fn large_upload_becomes_a_centred_slide() {
    let upload = png(3000, 2000);
    let compressed = compress(&upload, &CompressOptions::default()).expect("compress");
    assert_eq!(compressed.outcome, CompressOutcome::Reencoded);
    assert_eq!(compressed.dimensions, Dimensions::new(1400, 933));

    let source = SourceImage::decode(&compressed.bytes, SourceOrigin::Picked).unwrap();
    assert_eq!(source.dimensions(), Dimensions::new(1400, 933));

    let slide = compose(&source, ViewTransform::IDENTITY).unwrap();
    assert_eq!(slide.dimensions(), CANVAS);
    let r = slide.raster();

    // Drawn 1242 px tall, rows 54..1296; wider than the canvas.
    for y in [0, 40, 50, 1300, 1310, 1349] {
        assert_eq!(r.get_pixel(540, y).0, [255, 255, 255, 255], "row {y}");
    }
    for y in [60, 300, 675, 1000, 1290] {
        for x in [0, 540, 1079] {
            assert!(near(r.get_pixel(x, y).0, PAINT, 12), "({x}, {y})");
        }
    }

    let jpeg = slide.encode_jpeg(Quality::OUTPUT).unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1080, 1350));
}

#[test]
fn small_upload_is_stored_as_is() {
    let upload = png(900, 600);
    let compressed = compress(&upload, &CompressOptions::default()).unwrap();
    assert_eq!(compressed.bytes, upload);
}

#[test]
fn staged_result_round_trips_through_normalize() {
    // A staged image usually comes back in some other ratio.
    let staged = SourceImage::decode(&png(1024, 1024), SourceOrigin::Staged).unwrap();
    let once = normalize(&staged).unwrap();
    assert_eq!(once.dimensions(), CANVAS);

    let url = once.to_data_url(Quality::OUTPUT).unwrap();
    assert_eq!(normalize_data_url(&url).unwrap().dimensions(), CANVAS);

    let again = normalize(&SourceImage::from_raster(
        once.raster().clone(),
        SourceOrigin::Staged,
    ))
    .unwrap();
    assert_eq!(once, again);
}

#[test]
fn every_view_yields_a_canvas() {
    let source = SourceImage::decode(&png(640, 480), SourceOrigin::Picked).unwrap();
    for zoom in [0.6, 1.0, 1.6] {
        for offset in [-300.0, 0.0, 300.0] {
            let view = ViewTransform::IDENTITY
                .with_zoom(zoom)
                .with_offset_x(offset)
                .with_offset_y(-offset);
            assert_eq!(compose(&source, view).unwrap().dimensions(), CANVAS);
        }
    }
}
