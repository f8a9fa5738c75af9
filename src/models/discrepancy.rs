//! Discrepancy Models
//!
//! Field-level comparison outcomes between the two fused records and the
//! aggregate report with its consistency score.

use claimlens_core::clamp_confidence;
use serde::{Deserialize, Serialize};

/// Floor of the overall consistency score; never exactly 0.
pub const CONSISTENCY_SCORE_MIN: f64 = 0.05;

/// Ceiling of the overall consistency score; never exactly 1.
pub const CONSISTENCY_SCORE_MAX: f64 = 0.95;

/// Classification of one field-level comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    /// Normalized values are equal
    Match,
    /// Both values present but unequal
    Mismatch,
    /// Value missing on the estimate side
    MissingInEstimate,
    /// Value missing on the roof-report side
    MissingInRoof,
    /// Values overlap but are not clearly equal
    PartialMatch,
    /// Both sides missing; nothing to compare
    NeedsVerification,
}

impl std::fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonStatus::Match => write!(f, "match"),
            ComparisonStatus::Mismatch => write!(f, "mismatch"),
            ComparisonStatus::MissingInEstimate => write!(f, "missing_in_estimate"),
            ComparisonStatus::MissingInRoof => write!(f, "missing_in_roof"),
            ComparisonStatus::PartialMatch => write!(f, "partial_match"),
            ComparisonStatus::NeedsVerification => write!(f, "needs_verification"),
        }
    }
}

/// One field-level outcome of comparing the two records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonPoint {
    /// Logical field name, e.g. "roof_area_sqft"
    pub field: String,
    /// Display value from the estimate side, when present
    pub estimate_value: Option<String>,
    /// Context label for the estimate side, e.g. "sum of SQ line items"
    pub estimate_context: String,
    /// Display value from the roof-report side, when present
    pub roof_value: Option<String>,
    /// Context label for the roof side, e.g. "report summary page"
    pub roof_context: String,
    /// Classification of the comparison
    pub status: ComparisonStatus,
    /// Free-text note explaining the classification
    pub note: String,
    /// Blended confidence of the comparison
    pub confidence: f64,
}

impl ComparisonPoint {
    /// Create a point, clamping confidence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        field: impl Into<String>,
        estimate_value: Option<String>,
        estimate_context: impl Into<String>,
        roof_value: Option<String>,
        roof_context: impl Into<String>,
        status: ComparisonStatus,
        note: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            field: field.into(),
            estimate_value,
            estimate_context: estimate_context.into(),
            roof_value,
            roof_context: roof_context.into(),
            status,
            note: note.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Aggregate comparison report for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    /// Job identifier
    pub job_id: String,
    /// Field-level comparison outcomes
    pub comparison_points: Vec<ComparisonPoint>,
    /// Narrative summary of the comparison
    pub summary: String,
    /// Warnings raised during analysis
    pub warnings: Vec<String>,
    /// Overall consistency score in `[0.05, 0.95]`
    pub overall_consistency_score: f64,
}

impl DiscrepancyReport {
    /// Clamp a raw score into the report's allowed range.
    ///
    /// The score never reaches exactly 0 or 1, reflecting irreducible
    /// uncertainty in both extractions.
    pub fn clamp_score(raw: f64) -> f64 {
        if raw.is_nan() {
            return CONSISTENCY_SCORE_MIN;
        }
        raw.clamp(CONSISTENCY_SCORE_MIN, CONSISTENCY_SCORE_MAX)
    }

    /// Points with the given status.
    pub fn points_with_status(&self, status: ComparisonStatus) -> Vec<&ComparisonPoint> {
        self.comparison_points
            .iter()
            .filter(|p| p.status == status)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_score_bounds() {
        assert_eq!(DiscrepancyReport::clamp_score(-0.5), CONSISTENCY_SCORE_MIN);
        assert_eq!(DiscrepancyReport::clamp_score(0.0), CONSISTENCY_SCORE_MIN);
        assert_eq!(DiscrepancyReport::clamp_score(1.0), CONSISTENCY_SCORE_MAX);
        assert_eq!(DiscrepancyReport::clamp_score(1.7), CONSISTENCY_SCORE_MAX);
        assert_eq!(DiscrepancyReport::clamp_score(0.5), 0.5);
        assert_eq!(DiscrepancyReport::clamp_score(f64::NAN), CONSISTENCY_SCORE_MIN);
    }

    #[test]
    fn test_point_confidence_clamped() {
        let point = ComparisonPoint::new(
            "roof_area_sqft",
            Some("4000".to_string()),
            "line items",
            Some("3250".to_string()),
            "report",
            ComparisonStatus::Mismatch,
            "23% apart",
            1.4,
        );
        assert_eq!(point.confidence, 1.0);
    }

    #[test]
    fn test_points_with_status() {
        let report = DiscrepancyReport {
            job_id: "job-1".to_string(),
            comparison_points: vec![
                ComparisonPoint::new(
                    "a", None, "", None, "",
                    ComparisonStatus::NeedsVerification, "", 0.25,
                ),
                ComparisonPoint::new(
                    "b", Some("1".into()), "", Some("1".into()), "",
                    ComparisonStatus::Match, "", 0.9,
                ),
            ],
            summary: String::new(),
            warnings: Vec::new(),
            overall_consistency_score: 0.5,
        };
        assert_eq!(report.points_with_status(ComparisonStatus::Match).len(), 1);
        assert_eq!(
            report
                .points_with_status(ComparisonStatus::NeedsVerification)
                .len(),
            1
        );
    }
}
