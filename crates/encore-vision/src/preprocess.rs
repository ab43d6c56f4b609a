//! Challenge-image preprocessing ahead of recognition.
//!
//! The transforms exist solely to raise recognition accuracy on the small,
//! low-contrast challenge renders the page serves; they never change what
//! the characters say.

use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::VisionError;

/// Contrast adjustment applied after greyscale conversion.
const CONTRAST_BOOST: f32 = 100.0;

/// Upscale factor. Recognition engines resolve the glyph strokes noticeably
/// better at twice the captured size.
const UPSCALE_FACTOR: u32 = 2;

/// Prepare a captured challenge region for recognition: decode, convert to
/// greyscale, boost contrast, upscale 2x with linear filtering, and
/// re-encode as PNG.
pub fn prepare_for_recognition(raw: &[u8]) -> Result<Vec<u8>, VisionError> {
    let decoded = image::load_from_memory(raw).map_err(|e| VisionError::Decode(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());

    let processed = decoded
        .grayscale()
        .adjust_contrast(CONTRAST_BOOST)
        .resize_exact(
            width * UPSCALE_FACTOR,
            height * UPSCALE_FACTOR,
            FilterType::Triangle,
        );

    let mut out = Cursor::new(Vec::new());
    processed
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| VisionError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    /// Encode a small solid-color test image as PNG bytes.
    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            // A horizontal gradient so contrast adjustment has work to do.
            let v = (x * 255 / width.max(1)) as u8;
            *pixel = Rgb([v, v, v]);
        }
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_output_is_doubled_and_decodable() {
        let input = png_fixture(40, 16);
        let output = prepare_for_recognition(&input).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (80, 32));
    }

    #[test]
    fn test_output_is_greyscale() {
        let input = png_fixture(10, 10);
        let output = prepare_for_recognition(&input).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        for (_, _, pixel) in decoded.to_rgb8().enumerate_pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_garbage_input_rejected() {
        let result = prepare_for_recognition(b"not an image");
        assert!(matches!(result, Err(VisionError::Decode(_))));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(prepare_for_recognition(&[]).is_err());
    }
}
