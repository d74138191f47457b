//! Image encoding: `DynamicImage` → PNG bytes, base64 and data URIs.
//!
//! Used by the renderer's inline image mode, by archive packaging, and by
//! the vision layout classifier, which sends the page as a base64 PNG
//! attachment.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// `data:<mime>;base64,<payload>` for arbitrary bytes.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// A page image as an inline PNG data URI.
pub fn png_data_uri(img: &DynamicImage) -> Result<String, image::ImageError> {
    let bytes = png_bytes(img)?;
    debug!("Encoded {}x{} image → {} PNG bytes", img.width(), img.height(), bytes.len());
    Ok(data_uri("image/png", &bytes))
}

/// Encode a page as a base64 PNG attachment for a vision model.
///
/// PNG keeps thin ruling lines and small print intact. `detail: "high"`
/// lets tiling providers look at the page at full resolution.
#[cfg(feature = "vision-layout")]
pub fn encode_page(img: &DynamicImage) -> Result<edgequake_llm::ImageData, image::ImageError> {
    let b64 = STANDARD.encode(png_bytes(img)?);
    Ok(edgequake_llm::ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn png_data_uri_decodes_to_png() {
        let uri = png_data_uri(&red()).expect("encode should succeed");
        let payload = uri.strip_prefix("data:image/png;base64,").expect("prefix");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn data_uri_keeps_mime() {
        assert_eq!(data_uri("image/gif", b"GIF89a"), "data:image/gif;base64,R0lGODlh");
    }

    #[cfg(feature = "vision-layout")]
    #[test]
    fn encode_page_for_vision() {
        let data = encode_page(&red()).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert!(!data.data.is_empty());
    }
}
