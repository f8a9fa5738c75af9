//! Validation Result
//!
//! Produced after every stage attempt and consumed by the retry driver to
//! decide between accept and retry. Also surfaced on the final job record so
//! callers can see why a result was (or was not) trusted.

use serde::{Deserialize, Serialize};

use crate::field::clamp_confidence;

/// Outcome of validating a stage result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the result is structurally usable
    pub is_valid: bool,
    /// Independent confidence score in `[0.0, 1.0]`
    pub confidence: f64,
    /// Hard problems that make the result unusable
    #[serde(default)]
    pub errors: Vec<String>,
    /// Soft problems worth surfacing but not blocking
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Actionable suggestions for a retry or for the caller
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    /// A valid result with the given confidence.
    pub fn valid(confidence: f64) -> Self {
        Self {
            is_valid: true,
            confidence: clamp_confidence(confidence),
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// An invalid result carrying one error.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            confidence: 0.0,
            errors: vec![error.into()],
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add an error and mark the result invalid.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self.is_valid = false;
        self
    }

    /// Add a warning without affecting validity.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Add a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Override the confidence score (clamped).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    /// Whether this result clears the given acceptance threshold.
    pub fn passes(&self, confidence_threshold: f64) -> bool {
        self.is_valid && self.confidence >= confidence_threshold
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid(0.0)
    }
}
