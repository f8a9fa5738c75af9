//! ClaimLens Docs
//!
//! Document conversion collaborators consumed by the extraction agents:
//! text extraction (PDF text layer or plain UTF-8) and page-image encoding
//! for the vision path. Both are trait seams so deployments can swap in
//! heavier converters (OCR, PDF rasterizers) without touching the pipeline.

pub mod error;
pub mod image;
pub mod text;

pub use error::{DocsError, DocsResult};
pub use image::{
    ConvertOptions, ImageConverter, PageImage, PageImageFormat, RasterImageConverter,
};
pub use text::{DocumentTextExtractor, TextExtractor};
