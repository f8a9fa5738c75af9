//! Extracted Field Model
//!
//! `ExtractedField<T>` is the unit of uncertain data flowing through the
//! pipeline: a value paired with a confidence score, the extraction path that
//! produced it, a human-readable rationale, and the number of attempts it took.
//!
//! # Invariants
//! - `confidence` is always clamped to `[0.0, 1.0]` at construction.
//! - A `None` value caps confidence at `NULL_VALUE_MAX_CONFIDENCE` unless the
//!   field was built with `legitimately_absent` (a document that genuinely has
//!   no deductible is not a low-confidence extraction).

use serde::{Deserialize, Serialize};

/// Maximum confidence an absent value may carry, unless legitimately absent.
pub const NULL_VALUE_MAX_CONFIDENCE: f64 = 0.2;

/// Which extraction path produced a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    /// Direct text parsing of the document
    Text,
    /// Image/vision-based analysis
    Vision,
    /// Fused from both paths
    Hybrid,
    /// Degraded fallback extraction
    Fallback,
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSource::Text => write!(f, "text"),
            FieldSource::Vision => write!(f, "vision"),
            FieldSource::Hybrid => write!(f, "hybrid"),
            FieldSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A single extracted value with provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField<T> {
    /// The extracted value, if any
    pub value: Option<T>,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    /// Why the extractor believes (or doubts) this value
    pub rationale: String,
    /// Which path produced the value
    pub source: FieldSource,
    /// How many attempts the producing stage made
    #[serde(default)]
    pub attempts: u32,
}

impl<T> ExtractedField<T> {
    /// Create a field with a present value. Confidence is clamped to [0, 1].
    pub fn new(value: T, confidence: f64, rationale: impl Into<String>, source: FieldSource) -> Self {
        Self {
            value: Some(value),
            confidence: clamp_confidence(confidence),
            rationale: rationale.into(),
            source,
            attempts: 1,
        }
    }

    /// Create a field whose value could not be extracted.
    ///
    /// Confidence is capped at `NULL_VALUE_MAX_CONFIDENCE`.
    pub fn missing(rationale: impl Into<String>, source: FieldSource) -> Self {
        Self {
            value: None,
            confidence: 0.0,
            rationale: rationale.into(),
            source,
            attempts: 1,
        }
    }

    /// Create a field that is genuinely absent from the document.
    ///
    /// This is the one case where a `None` value may carry high confidence:
    /// the extractor is confident the document does not contain the field.
    pub fn legitimately_absent(
        confidence: f64,
        rationale: impl Into<String>,
        source: FieldSource,
    ) -> Self {
        Self {
            value: None,
            confidence: clamp_confidence(confidence),
            rationale: rationale.into(),
            source,
            attempts: 1,
        }
    }

    /// Create a field from an optional value, applying the null-confidence cap.
    pub fn from_option(
        value: Option<T>,
        confidence: f64,
        rationale: impl Into<String>,
        source: FieldSource,
    ) -> Self {
        let confidence = if value.is_none() {
            clamp_confidence(confidence).min(NULL_VALUE_MAX_CONFIDENCE)
        } else {
            clamp_confidence(confidence)
        };
        Self {
            value,
            confidence,
            rationale: rationale.into(),
            source,
            attempts: 1,
        }
    }

    /// Whether a value is present.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Record the attempt count from the producing stage.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Rewrite the provenance of this field.
    pub fn with_source(mut self, source: FieldSource) -> Self {
        self.source = source;
        self
    }

    /// Append to the rationale, preserving the existing text.
    pub fn append_rationale(&mut self, extra: &str) {
        if !self.rationale.is_empty() {
            self.rationale.push_str("; ");
        }
        self.rationale.push_str(extra);
    }

    /// Map the value type, keeping confidence and provenance.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExtractedField<U> {
        ExtractedField {
            value: self.value.map(f),
            confidence: self.confidence,
            rationale: self.rationale,
            source: self.source,
            attempts: self.attempts,
        }
    }

    /// Borrowed display form of the value, for comparison reports.
    pub fn display_value(&self) -> Option<String>
    where
        T: std::fmt::Display,
    {
        self.value.as_ref().map(|v| v.to_string())
    }
}

/// Clamp a confidence score into [0.0, 1.0]. NaN maps to 0.0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Mean confidence across a set of fields, 0.0 when empty.
pub fn mean_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    clamp_confidence(confidences.iter().sum::<f64>() / confidences.len() as f64)
}
