//! Image encoding: canvas-sized `DynamicImage` → bytes in the page format.
//!
//! WebP is the default: the `image` crate writes it losslessly, which keeps
//! small print sharp while still beating PNG on size for most scanned and
//! typeset pages. JPEG is offered for photo-heavy documents where lossy
//! compression pays off.

use crate::config::PageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page.
///
/// `jpeg_quality` is ignored for lossless formats.
pub fn encode_page(
    img: &DynamicImage,
    format: PageFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PageFormat::Webp => {
            // The lossless WebP encoder takes RGB(A)8 only.
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
        PageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        PageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, jpeg_quality))?;
        }
    }
    debug!(format = format.extension(), bytes = buf.len(), "Encoded page");
    Ok(buf)
}
