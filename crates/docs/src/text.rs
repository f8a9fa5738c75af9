//! Text Extraction Collaborator
//!
//! Narrow interface over document-to-text conversion. The shipped
//! implementation handles PDF (via pdf-extract) and plain UTF-8 text;
//! anything else is an unreadable-document error the caller can act on.

use tracing::debug;

use crate::error::{DocsError, DocsResult};

/// PDF file magic bytes
const PDF_MAGIC: &[u8] = b"%PDF";

/// Extracts plain text from document bytes.
pub trait TextExtractor: Send + Sync {
    /// Extract text from the document. May fail on unreadable input.
    fn extract_text(&self, document: &[u8]) -> DocsResult<String>;
}

/// Default extractor: PDF text layer or raw UTF-8.
#[derive(Debug, Default, Clone)]
pub struct DocumentTextExtractor;

impl DocumentTextExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for DocumentTextExtractor {
    fn extract_text(&self, document: &[u8]) -> DocsResult<String> {
        if document.is_empty() {
            return Err(DocsError::unreadable("empty document"));
        }

        if document.starts_with(PDF_MAGIC) {
            let text = pdf_extract::extract_text_from_mem(document)
                .map_err(|e| DocsError::unreadable(format!("PDF text extraction failed: {e}")))?;
            debug!(chars = text.len(), "extracted text from PDF");
            return Ok(text);
        }

        match std::str::from_utf8(document) {
            Ok(text) => {
                debug!(chars = text.len(), "document treated as plain text");
                Ok(text.to_string())
            }
            Err(_) => Err(DocsError::unreadable(
                "document is neither PDF nor valid UTF-8 text",
            )),
        }
    }
}
