//! Supplement Recommendation Models

use claimlens_core::{clamp_confidence, ExtractedField};
use serde::{Deserialize, Serialize};

/// Priority of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RecommendationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationPriority::Low => write!(f, "low"),
            RecommendationPriority::Medium => write!(f, "medium"),
            RecommendationPriority::High => write!(f, "high"),
        }
    }
}

/// Category of a recommended supplement item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    /// Roofing materials (starter, ridge cap, drip edge, ...)
    Material,
    /// Labor adjustments (steep pitch, height)
    Labor,
    /// Code or manufacturer requirements (ice & water barrier)
    Code,
}

/// A suggested additional line item with quantity and justification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementRecommendation {
    /// Stable identifier of the producing rule
    pub id: String,
    /// Item description for the supplement request
    pub description: String,
    /// Recommended quantity, carrying the confidence of its source field
    pub quantity: ExtractedField<f64>,
    /// Unit of measure, e.g. "LF", "SQ", "EA"
    pub unit: String,
    /// Why the item is recommended
    pub reasoning: String,
    /// Overall confidence in the recommendation
    pub confidence: f64,
    /// Item category
    pub category: RecommendationCategory,
    /// Priority for the supplement request
    pub priority: RecommendationPriority,
    /// Evidence supporting the recommendation
    pub supporting_evidence: Vec<String>,
}

impl SupplementRecommendation {
    /// Create a recommendation, clamping confidence.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        quantity: ExtractedField<f64>,
        unit: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: f64,
        category: RecommendationCategory,
        priority: RecommendationPriority,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            quantity,
            unit: unit.into(),
            reasoning: reasoning.into(),
            confidence: clamp_confidence(confidence),
            category,
            priority,
            supporting_evidence: Vec::new(),
        }
    }

    /// Attach supporting evidence.
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.supporting_evidence = evidence;
        self
    }
}

#[cfg(test)]
mod tests {
    use claimlens_core::FieldSource;

    use super::*;

    #[test]
    fn test_recommendation_construction() {
        let quantity = ExtractedField::new(150.0, 0.8, "eave length", FieldSource::Hybrid);
        let rec = SupplementRecommendation::new(
            "starter-shingles",
            "Asphalt starter course",
            quantity,
            "LF",
            "eave length present but no starter line item",
            0.72,
            RecommendationCategory::Material,
            RecommendationPriority::High,
        )
        .with_evidence(vec!["roof report eave length: 150 LF".to_string()]);

        assert_eq!(rec.quantity.value, Some(150.0));
        assert_eq!(rec.unit, "LF");
        assert_eq!(rec.supporting_evidence.len(), 1);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(RecommendationPriority::High > RecommendationPriority::Medium);
        assert!(RecommendationPriority::Medium > RecommendationPriority::Low);
    }
}
