//! Image encoding: `DynamicImage` → PNG bytes for the OCR request.
//!
//! PNG is chosen over JPEG because it is lossless. Handwriting strokes and
//! superscripts are thin; JPEG ringing around them measurably hurts OCR.

use bytes::Bytes;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_page(img: &DynamicImage) -> Result<Bytes, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} page → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(Bytes::from(buf))
}
