//! Image encoding: `DynamicImage` → base64 PNG wrapped in a [`PageImage`].
//!
//! Multimodal APIs accept images as base64 payloads inside the JSON request
//! body. PNG is lossless, so article codes and postal codes stay crisp.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Media type of every page image.
pub const PAGE_MEDIA_TYPE: &str = "image/png";

/// One rasterised page, ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    /// Base64 (standard alphabet, padded) PNG bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Convert to the provider-neutral image attachment.
    ///
    /// `detail: "high"` keeps fine print readable on OpenAI-style tiling.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), PAGE_MEDIA_TYPE).with_detail("high")
    }
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_png(page_num: usize, img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data = STANDARD.encode(&buf);
    debug!("Encoded page {} → {} bytes base64", page_num, data.len());

    Ok(PageImage {
        page_num,
        data,
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 6, Rgba([255, 0, 0, 255])));
        let page = encode_png(1, &img).expect("encode should succeed");
        assert_eq!((page.width, page.height), (10, 6));

        let png = STANDARD.decode(&page.data).expect("valid base64");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let back = image::load_from_memory(&png).expect("decodable png").to_rgba8();
        assert_eq!(back.get_pixel(3, 3), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn image_data_carries_png_media_type() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let data = encode_png(4, &img).unwrap().to_image_data();
        assert_eq!(data.mime_type, "image/png");
    }
}
