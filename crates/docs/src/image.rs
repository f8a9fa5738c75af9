//! Image Conversion Collaborator
//!
//! Narrow interface over document-to-image conversion for the vision
//! extraction path. The shipped implementation re-encodes raster inputs
//! (scanned estimates and roof reports commonly arrive as PNG/JPEG) into
//! normalized base64 page images. Rasterizing multi-page PDFs is an external
//! collaborator concern behind the same trait.

use std::io::Cursor;

use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DocsError, DocsResult};

/// Output encoding for page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageImageFormat {
    Png,
    Jpeg,
}

impl PageImageFormat {
    /// MIME type for the format.
    pub fn media_type(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
            PageImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Options for document-to-image conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Longest-edge pixel budget; larger inputs are downscaled
    pub max_edge: u32,
    /// Output encoding
    pub format: PageImageFormat,
    /// JPEG quality (ignored for PNG)
    pub quality: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_edge: 2048,
            format: PageImageFormat::Png,
            quality: 85,
        }
    }
}

/// One page rendered as a base64 image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    /// Zero-based page index
    pub page: usize,
    /// MIME type of the encoded image
    pub media_type: String,
    /// Base64-encoded image data
    pub data: String,
}

/// Converts document bytes into page images for vision analysis.
pub trait ImageConverter: Send + Sync {
    /// Convert the document into one image per page.
    fn convert_to_images(&self, document: &[u8], options: &ConvertOptions)
        -> DocsResult<Vec<PageImage>>;
}

/// Default converter: decodes raster inputs, downscales to the pixel budget,
/// and re-encodes. Documents that are not raster images are unsupported here;
/// the caller treats that as "vision path unavailable".
#[derive(Debug, Default, Clone)]
pub struct RasterImageConverter;

impl RasterImageConverter {
    /// Create a new converter.
    pub fn new() -> Self {
        Self
    }
}

impl ImageConverter for RasterImageConverter {
    fn convert_to_images(
        &self,
        document: &[u8],
        options: &ConvertOptions,
    ) -> DocsResult<Vec<PageImage>> {
        let decoded = image::load_from_memory(document).map_err(|_| {
            DocsError::unsupported("document is not a raster image; no rasterizer configured")
        })?;

        let (w, h) = (decoded.width(), decoded.height());
        let image = if w.max(h) > options.max_edge {
            decoded.resize(
                options.max_edge,
                options.max_edge,
                image::imageops::FilterType::Triangle,
            )
        } else {
            decoded
        };

        let mut buffer = Cursor::new(Vec::new());
        match options.format {
            PageImageFormat::Png => image.write_to(&mut buffer, ImageFormat::Png)?,
            PageImageFormat::Jpeg => image.write_to(&mut buffer, ImageFormat::Jpeg)?,
        }

        let data = base64::engine::general_purpose::STANDARD.encode(buffer.into_inner());
        debug!(
            width = image.width(),
            height = image.height(),
            bytes = data.len(),
            "encoded page image"
        );

        Ok(vec![PageImage {
            page: 0,
            media_type: options.format.media_type().to_string(),
            data,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_convert_png_round_trip() {
        let converter = RasterImageConverter::new();
        let pages = converter
            .convert_to_images(&png_fixture(64, 48), &ConvertOptions::default())
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].media_type, "image/png");
        assert!(!pages[0].data.is_empty());
    }

    #[test]
    fn test_downscales_to_pixel_budget() {
        let converter = RasterImageConverter::new();
        let options = ConvertOptions {
            max_edge: 32,
            ..ConvertOptions::default()
        };
        let pages = converter
            .convert_to_images(&png_fixture(256, 128), &options)
            .unwrap();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&pages[0].data)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(decoded.width() <= 32 && decoded.height() <= 32);
    }

    #[test]
    fn test_non_image_is_unsupported() {
        let converter = RasterImageConverter::new();
        let err = converter
            .convert_to_images(b"%PDF-1.7 fake", &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, DocsError::Unsupported(_)));
    }

    #[test]
    fn test_jpeg_output_format() {
        let converter = RasterImageConverter::new();
        let options = ConvertOptions {
            format: PageImageFormat::Jpeg,
            ..ConvertOptions::default()
        };
        let pages = converter
            .convert_to_images(&png_fixture(16, 16), &options)
            .unwrap();
        assert_eq!(pages[0].media_type, "image/jpeg");
    }
}
