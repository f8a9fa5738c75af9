//! Document Collaborator Errors

use thiserror::Error;

/// Errors from the document conversion collaborators.
#[derive(Error, Debug)]
pub enum DocsError {
    /// The document bytes could not be read as any supported format
    #[error("Unreadable document: {0}")]
    Unreadable(String),

    /// The operation is not supported for this document type
    #[error("Unsupported document: {0}")]
    Unsupported(String),

    /// Image decoding/encoding failed
    #[error("Image error: {0}")]
    Image(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for document operations
pub type DocsResult<T> = Result<T, DocsError>;

impl DocsError {
    /// Create an unreadable-document error
    pub fn unreadable(msg: impl Into<String>) -> Self {
        Self::Unreadable(msg.into())
    }

    /// Create an unsupported-document error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

impl From<image::ImageError> for DocsError {
    fn from(err: image::ImageError) -> Self {
        DocsError::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocsError::unreadable("not a PDF");
        assert_eq!(err.to_string(), "Unreadable document: not a PDF");
    }
}
