//! Shared fixtures for unit tests.

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;

use crate::types::RgbaImage;

/// A solid-colour PNG of the given size.
#[allow(clippy::unwrap_used)]
pub fn png_bytes(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// A grey JPEG of `w`×`h` stored pixels carrying an EXIF orientation tag.
#[allow(clippy::unwrap_used)]
pub fn rotated_jpeg_bytes(w: u32, h: u32, orientation: u16) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb([90, 90, 90]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::Rgb8)
        .unwrap();

    // Little-endian TIFF with one IFD entry: 0x0112 (Orientation), SHORT, 1.
    let mut exif = b"Exif\0\0II\x2a\0\x08\0\0\0".to_vec();
    exif.extend_from_slice(&1u16.to_le_bytes());
    exif.extend_from_slice(&0x0112u16.to_le_bytes());
    exif.extend_from_slice(&3u16.to_le_bytes());
    exif.extend_from_slice(&1u32.to_le_bytes());
    exif.extend_from_slice(&orientation.to_le_bytes());
    exif.extend_from_slice(&[0, 0]);
    exif.extend_from_slice(&0u32.to_le_bytes());

    let segment_len = u16::try_from(exif.len() + 2).unwrap();
    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&segment_len.to_be_bytes());
    app1.extend_from_slice(&exif);

    // After SOI, and after a JFIF APP0 if the encoder wrote one.
    let mut at = 2;
    if jpeg[2..4] == [0xFF, 0xE0] {
        at = 4 + usize::from(u16::from_be_bytes([jpeg[4], jpeg[5]]));
    }
    jpeg.splice(at..at, app1);
    jpeg
}
