//! Core Error Types
//!
//! Defines the foundational error types used across the ClaimLens workspace.
//! These error types are dependency-free (only thiserror + std) to keep the
//! core crate lightweight.
//!
//! The main application crate extends these with additional error variants
//! (e.g., Database, Llm) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the ClaimLens workspace.
///
/// This is the minimal error set that the core crate needs. The application
/// crate defines additional variants for storage, providers, etc.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Extraction errors (document unreadable or a collaborator threw)
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Parse errors (collaborator response not in the expected form)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage attempt exceeded its configured timeout
    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// A stage exhausted its retry budget without producing any result
    #[error("Stage '{stage}' failed after {attempts} attempts: {last_error}")]
    StageExhausted {
        stage: String,
        attempts: u32,
        last_error: String,
    },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an extraction error
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
