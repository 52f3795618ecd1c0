//! Image encoding: `DynamicImage` → base64 JPEG.
//!
//! Pages travel as JPEG (quality 80 by default) because the request body of
//! the analysis endpoint is bounded and titles/body copy survive moderate
//! compression well. JPEG has no alpha channel, so the page is flattened to
//! RGB first.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const JPEG_MIME: &str = "image/jpeg";

/// A page image ready to be sent to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 payload without any data-URI prefix.
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn jpeg(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: JPEG_MIME.to_string(),
        }
    }

    /// `data:<mime>;base64,<payload>` form, as a browser canvas produces it.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Accept either a bare base64 payload or a data URI.
    pub fn from_data_uri(input: &str) -> Self {
        match RE_DATA_URI.captures(input) {
            Some(caps) => Self {
                mime_type: format!("image/{}", &caps[1]),
                data: input[caps[0].len()..].to_string(),
            },
            None => Self::jpeg(input),
        }
    }
}

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/(\w+);base64,").unwrap());

/// Encode a rasterised page as base64 JPEG at the given quality.
pub fn encode_page(img: &DynamicImage, quality: u8) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(EncodedImage::jpeg(b64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img, 80).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn strips_data_uri_prefix() {
        let uri = EncodedImage::from_data_uri("data:image/jpeg;base64,/9j/4AAQ");
        assert_eq!(uri.data, "/9j/4AAQ");
        let bare = EncodedImage::from_data_uri("/9j/4AAQ");
        assert_eq!(bare.data, "/9j/4AAQ");
        assert_eq!(bare.mime_type, "image/jpeg");
    }

    #[test]
    fn data_uri_round_trip_keeps_mime() {
        let img = EncodedImage::from_data_uri("data:image/png;base64,iVBOR");
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, "iVBOR");
        assert_eq!(img.to_data_uri(), "data:image/png;base64,iVBOR");

        let bare = EncodedImage::from_data_uri("/9j/4AAQ");
        assert_eq!(bare.mime_type, JPEG_MIME);
    }
}
