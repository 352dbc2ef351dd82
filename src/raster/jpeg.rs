// Phase 5: image crate: グレー/RGB画像 -> JPEG bytes

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, RgbImage};

use crate::error::PdfMonoError;

fn check_quality(quality: u8) -> crate::error::Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(PdfMonoError::jpeg_encode(format!(
            "JPEG quality must be 1-100, got {}",
            quality
        )));
    }
    Ok(())
}

/// Encode raw 8-bit grayscale pixels to JPEG bytes.
///
/// # Arguments
/// * `gray`    - One byte per pixel, row-major
/// * `width`   - Image width in pixels
/// * `height`  - Image height in pixels
/// * `quality` - JPEG quality (1 = worst, 100 = best)
pub fn encode_gray_buffer_to_jpeg(
    gray: Vec<u8>,
    width: u32,
    height: u32,
    quality: u8,
) -> crate::error::Result<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| {
            PdfMonoError::jpeg_encode(format!(
                "Overflow computing buffer size for {}x{} gray image",
                width, height
            ))
        })?;

    if gray.len() != expected_len {
        return Err(PdfMonoError::jpeg_encode(format!(
            "Gray data size mismatch: expected {} bytes, got {}",
            expected_len,
            gray.len()
        )));
    }

    let img = GrayImage::from_raw(width, height, gray)
        .ok_or_else(|| PdfMonoError::jpeg_encode("Failed to create image from gray data"))?;

    encode_gray_to_jpeg(&img, quality)
}

/// Encode a grayscale image to a single-component JPEG.
pub fn encode_gray_to_jpeg(gray: &GrayImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    check_quality(quality)?;
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    gray.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}

/// Encode an RGB image to JPEG bytes.
pub fn encode_rgb_to_jpeg(rgb: &RgbImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    check_quality(quality)?;
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;

    Ok(buf.into_inner())
}
