//! Discrepancy Engine
//!
//! Field-by-field reconciliation of the fused estimate against the fused
//! roof report. Estimate-side values for roof quantities are derived from
//! line items (starter courses for eaves, ridge caps for ridge/hip, and so
//! on); roof-side values come straight from the measurement record. The
//! engine degrades gracefully when the roof record is absent.
//!
//! Scoring constants are deliberate behavior-parity values, not retuned.

use std::time::Instant;

use async_trait::async_trait;
use claimlens_core::{
    CoreResult, ExtractedField, PipelineStage, StageConfig, StagePlan, StageResult, TaskContext,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{
    ComparisonPoint, ComparisonStatus, DiscrepancyReport, EstimateRecord, RoofMeasurementRecord,
    SQFT_PER_SQUARE,
};

/// Relative difference below which two numeric values count as equal.
const NUMERIC_MATCH_RATIO: f64 = 0.02;

/// Relative difference above which a warning is raised.
pub const RATIO_WARN: f64 = 0.10;

/// Relative difference above which the stronger warning is raised.
pub const RATIO_STRONG_WARN: f64 = 0.20;

/// Mismatch confidence is this fraction of the lower input confidence.
pub const MISMATCH_CONFIDENCE_FACTOR: f64 = 0.7;

/// Partial-match confidence is this fraction of the lower input confidence.
pub const PARTIAL_MATCH_CONFIDENCE_FACTOR: f64 = 0.85;

/// Fixed confidence for both-sides-missing comparisons.
pub const NEEDS_VERIFICATION_CONFIDENCE: f64 = 0.25;

/// Fixed score penalty per warning raised.
pub const WARNING_PENALTY: f64 = 0.05;

/// Cap on the proportional reduction a single numeric discrepancy applies.
const MAX_PROPORTIONAL_REDUCTION: f64 = 0.5;

// Comparison-status weights for the consistency score.
const WEIGHT_MATCH: f64 = 2.0;
const WEIGHT_PARTIAL_MATCH: f64 = 1.0;
const WEIGHT_MISMATCH: f64 = -1.5;
const WEIGHT_MISSING: f64 = -0.75;
const WEIGHT_NEEDS_VERIFICATION: f64 = -0.5;

/// One numeric value with its confidence and a context label.
#[derive(Debug, Clone)]
struct SideValue {
    value: f64,
    confidence: f64,
    context: String,
}

/// The discrepancy engine.
#[derive(Debug, Default, Clone)]
pub struct DiscrepancyEngine;

impl DiscrepancyEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Compare the fused records and produce the report.
    pub fn analyze(
        &self,
        job_id: &str,
        estimate: &EstimateRecord,
        roof: Option<&RoofMeasurementRecord>,
    ) -> DiscrepancyReport {
        let mut warnings: Vec<String> = Vec::new();
        let mut points: Vec<ComparisonPoint> = Vec::new();

        // Roof area: SQ line items against the report's total area.
        let estimate_area = positive(estimate.total_quantity_for_unit("SQ") * SQFT_PER_SQUARE)
            .map(|v| SideValue {
                value: v,
                confidence: estimate.line_items.confidence,
                context: "sum of SQ line items, in sq ft".to_string(),
            });
        points.push(compare_numeric(
            "roof_area_sqft",
            "roof area",
            estimate_area,
            roof_side(roof, |r| &r.total_area_sqft, "report total area"),
            &mut warnings,
        ));

        // Eave length: starter-course line items against the report.
        let starter_length = positive(sum_for_keywords(estimate, &["starter"])).map(|v| SideValue {
            value: v,
            confidence: estimate.line_items.confidence,
            context: "sum of starter-course LF line items".to_string(),
        });
        points.push(compare_numeric(
            "eave_length_ft",
            "eave length",
            starter_length,
            roof_side(roof, |r| &r.eave_length_ft, "report eave length"),
            &mut warnings,
        ));

        // Ridge/hip length: ridge cap line items against the report.
        let ridge_length = positive(sum_for_keywords(estimate, &["ridge"])).map(|v| SideValue {
            value: v,
            confidence: estimate.line_items.confidence,
            context: "sum of ridge-cap LF line items".to_string(),
        });
        points.push(compare_numeric(
            "ridge_hip_length_ft",
            "ridge/hip length",
            ridge_length,
            roof_side(roof, |r| &r.ridge_hip_length_ft, "report ridge/hip length"),
            &mut warnings,
        ));

        // Valley length: valley/ice & water line items against the report.
        let valley_length = positive(sum_for_keywords(
            estimate,
            &["valley", "ice & water", "ice and water"],
        ))
        .map(|v| SideValue {
            value: v,
            confidence: estimate.line_items.confidence,
            context: "sum of valley-protection LF line items".to_string(),
        });
        points.push(compare_numeric(
            "valley_length_ft",
            "valley length",
            valley_length,
            roof_side(roof, |r| &r.valley_length_ft, "report valley length"),
            &mut warnings,
        ));

        if roof.is_none() {
            warnings.push("no roof report available; comparisons are one-sided".to_string());
        }

        let score = consistency_score(&points, &warnings);
        let summary = summarize(&points, score);

        info!(
            job_id,
            points = points.len(),
            warnings = warnings.len(),
            score,
            "discrepancy analysis complete"
        );

        DiscrepancyReport {
            job_id: job_id.to_string(),
            comparison_points: points,
            summary,
            warnings,
            overall_consistency_score: score,
        }
    }
}

/// Sum of LF quantities over line items mentioning any keyword.
fn sum_for_keywords(estimate: &EstimateRecord, keywords: &[&str]) -> f64 {
    estimate
        .items()
        .iter()
        .filter(|item| item.mentions_any(keywords))
        .filter(|item| item.unit.eq_ignore_ascii_case("LF"))
        .map(|item| item.quantity)
        .sum()
}

fn positive(value: f64) -> Option<f64> {
    if value > 0.0 {
        Some(value)
    } else {
        None
    }
}

fn roof_side<'a>(
    roof: Option<&'a RoofMeasurementRecord>,
    field: impl Fn(&'a RoofMeasurementRecord) -> &'a ExtractedField<f64>,
    context: &str,
) -> Option<SideValue> {
    let record = roof?;
    let extracted = field(record);
    extracted.value.map(|value| SideValue {
        value,
        confidence: extracted.confidence,
        context: context.to_string(),
    })
}

/// Classify one numeric comparison and raise ratio warnings.
fn compare_numeric(
    field: &str,
    label: &str,
    estimate: Option<SideValue>,
    roof: Option<SideValue>,
    warnings: &mut Vec<String>,
) -> ComparisonPoint {
    match (estimate, roof) {
        (Some(est), Some(roof_value)) => {
            let diff = relative_difference(est.value, roof_value.value);
            let low_confidence = est.confidence.min(roof_value.confidence);

            let (status, confidence, note) = if diff <= NUMERIC_MATCH_RATIO {
                (
                    ComparisonStatus::Match,
                    low_confidence,
                    format!("values agree within {:.0}%", NUMERIC_MATCH_RATIO * 100.0),
                )
            } else if diff <= RATIO_WARN {
                (
                    ComparisonStatus::PartialMatch,
                    low_confidence * PARTIAL_MATCH_CONFIDENCE_FACTOR,
                    format!("values within {:.0}% of each other", diff * 100.0),
                )
            } else {
                (
                    ComparisonStatus::Mismatch,
                    low_confidence * MISMATCH_CONFIDENCE_FACTOR,
                    format!("values differ by {:.0}%", diff * 100.0),
                )
            };

            if diff > RATIO_STRONG_WARN {
                warnings.push(format!(
                    "significant {label} discrepancy: {:.0} vs {:.0} ({:.0}% apart)",
                    est.value,
                    roof_value.value,
                    diff * 100.0
                ));
            } else if diff > RATIO_WARN {
                warnings.push(format!(
                    "{label} discrepancy: {:.0} vs {:.0} ({:.0}% apart)",
                    est.value,
                    roof_value.value,
                    diff * 100.0
                ));
            }

            ComparisonPoint::new(
                field,
                Some(format_value(est.value)),
                est.context,
                Some(format_value(roof_value.value)),
                roof_value.context,
                status,
                note,
                confidence,
            )
        }
        (None, Some(roof_value)) => ComparisonPoint::new(
            field,
            None,
            "not derivable from line items",
            Some(format_value(roof_value.value)),
            roof_value.context,
            ComparisonStatus::MissingInEstimate,
            format!("{label} present only in the roof report"),
            roof_value.confidence,
        ),
        (Some(est), None) => ComparisonPoint::new(
            field,
            Some(format_value(est.value)),
            est.context,
            None,
            "not present in roof report",
            ComparisonStatus::MissingInRoof,
            format!("{label} present only in the estimate"),
            est.confidence,
        ),
        (None, None) => ComparisonPoint::new(
            field,
            None,
            "not derivable from line items",
            None,
            "not present in roof report",
            ComparisonStatus::NeedsVerification,
            format!("{label} unavailable on both sides"),
            NEEDS_VERIFICATION_CONFIDENCE,
        ),
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// Relative difference against the larger magnitude.
fn relative_difference(a: f64, b: f64) -> f64 {
    let max = a.abs().max(b.abs());
    if max == 0.0 {
        0.0
    } else {
        (a - b).abs() / max
    }
}

/// Confidence-weighted consistency score over all comparison points.
///
/// Weighted sum normalized against the maximum possible score, reduced
/// proportionally by large numeric discrepancies and by a fixed penalty per
/// warning, clamped into the report's [0.05, 0.95] range.
fn consistency_score(points: &[ComparisonPoint], warnings: &[String]) -> f64 {
    let mut raw = 0.0;
    let mut max = 0.0;

    for point in points {
        let weight = match point.status {
            ComparisonStatus::Match => WEIGHT_MATCH,
            ComparisonStatus::PartialMatch => WEIGHT_PARTIAL_MATCH,
            ComparisonStatus::Mismatch => WEIGHT_MISMATCH,
            ComparisonStatus::MissingInEstimate | ComparisonStatus::MissingInRoof => WEIGHT_MISSING,
            ComparisonStatus::NeedsVerification => WEIGHT_NEEDS_VERIFICATION,
        };
        raw += weight * point.confidence;
        max += WEIGHT_MATCH * point.confidence;
    }

    let mut score = if max > 0.0 { raw / max } else { 0.0 };

    // Large numeric discrepancies reduce the estimate proportionally.
    for point in points {
        if point.status == ComparisonStatus::Mismatch {
            if let (Some(est), Some(roof)) = (
                point.estimate_value.as_deref().and_then(|v| v.parse::<f64>().ok()),
                point.roof_value.as_deref().and_then(|v| v.parse::<f64>().ok()),
            ) {
                let diff = relative_difference(est, roof);
                if diff > RATIO_WARN {
                    score *= 1.0 - diff.min(MAX_PROPORTIONAL_REDUCTION);
                }
            }
        }
    }

    score -= WARNING_PENALTY * warnings.len() as f64;
    DiscrepancyReport::clamp_score(score)
}

fn summarize(points: &[ComparisonPoint], score: f64) -> String {
    let count = |status: ComparisonStatus| points.iter().filter(|p| p.status == status).count();
    format!(
        "Compared {} fields: {} match, {} partial, {} mismatch, {} missing on one side, {} need verification. Consistency {:.2}.",
        points.len(),
        count(ComparisonStatus::Match),
        count(ComparisonStatus::PartialMatch),
        count(ComparisonStatus::Mismatch),
        count(ComparisonStatus::MissingInEstimate) + count(ComparisonStatus::MissingInRoof),
        count(ComparisonStatus::NeedsVerification),
        score
    )
}

/// Input to the discrepancy stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyInput {
    /// Fused estimate record
    pub estimate: EstimateRecord,
    /// Fused roof record, when a roof document was extracted
    pub roof: Option<RoofMeasurementRecord>,
}

/// The discrepancy engine wrapped in the standard stage contract.
///
/// The analysis itself is deterministic, so the stage runs with no retries
/// and a permissive acceptance threshold.
pub struct DiscrepancyStage {
    config: StageConfig,
    engine: DiscrepancyEngine,
}

impl DiscrepancyStage {
    /// Create the stage.
    pub fn new() -> Self {
        Self {
            config: StageConfig::new("discrepancy_analysis")
                .with_max_retries(0)
                .with_confidence_threshold(0.2),
            engine: DiscrepancyEngine::new(),
        }
    }
}

impl Default for DiscrepancyStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for DiscrepancyStage {
    type Input = DiscrepancyInput;
    type Output = DiscrepancyReport;

    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn plan(&self, input: &DiscrepancyInput, _ctx: &TaskContext) -> CoreResult<StagePlan> {
        let sides = if input.roof.is_some() { "both records" } else { "estimate only" };
        Ok(StagePlan::single(
            format!("classify comparison points over {sides}"),
            50,
            0.9,
        ))
    }

    async fn act(
        &self,
        input: &DiscrepancyInput,
        ctx: &TaskContext,
    ) -> CoreResult<StageResult<DiscrepancyReport>> {
        let started = Instant::now();
        let report = self
            .engine
            .analyze(&ctx.job_id, &input.estimate, input.roof.as_ref());

        let validation = assess_report(&report);
        debug!(job_id = %ctx.job_id, score = report.overall_consistency_score, "discrepancy stage done");

        Ok(StageResult::new(
            report,
            validation,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn validate(
        &self,
        result: &StageResult<DiscrepancyReport>,
        _ctx: &TaskContext,
    ) -> CoreResult<ValidationResult> {
        Ok(assess_report(&result.data))
    }
}

/// Score the report by how much of it is actually classified: a report that
/// is all NEEDS_VERIFICATION carries little signal.
fn assess_report(report: &DiscrepancyReport) -> ValidationResult {
    let total = report.comparison_points.len();
    if total == 0 {
        return ValidationResult::invalid("no comparison points produced");
    }
    let classified = report
        .comparison_points
        .iter()
        .filter(|p| p.status != ComparisonStatus::NeedsVerification)
        .count();
    let confidence = 0.3 + 0.7 * (classified as f64 / total as f64);

    let mut validation = ValidationResult::valid(confidence);
    for warning in &report.warnings {
        validation = validation.with_warning(warning.clone());
    }
    validation
}

#[cfg(test)]
mod tests {
    use claimlens_core::{execute_stage, FieldSource};

    use super::*;
    use crate::models::LineItem;

    fn estimate_with_items(items: Vec<LineItem>, confidence: f64) -> EstimateRecord {
        let mut record = EstimateRecord::empty("test", FieldSource::Text);
        record.line_items =
            ExtractedField::new(items, confidence, "parsed table", FieldSource::Text);
        record
    }

    fn roof_with_area(area: f64, confidence: f64) -> RoofMeasurementRecord {
        let mut record = RoofMeasurementRecord::empty("test", FieldSource::Text);
        record.total_area_sqft =
            ExtractedField::new(area, confidence, "summary", FieldSource::Text);
        record
    }

    #[test]
    fn test_matching_area_scores_high() {
        let estimate = estimate_with_items(
            vec![LineItem::new("Laminated shingles", 32.5, "SQ")],
            0.9,
        );
        let roof = roof_with_area(3250.0, 0.9);

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, Some(&roof));

        let area_point = &report.comparison_points[0];
        assert_eq!(area_point.status, ComparisonStatus::Match);
        assert!(report.overall_consistency_score > 0.2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_significant_area_discrepancy_warns_and_drops_score() {
        // 4000 sq ft implied by line items vs 3250 reported: 23% apart.
        let estimate = estimate_with_items(
            vec![LineItem::new("Laminated shingles", 40.0, "SQ")],
            0.85,
        );
        let roof = roof_with_area(3250.0, 0.9);

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, Some(&roof));

        let area_point = &report.comparison_points[0];
        assert_eq!(area_point.status, ComparisonStatus::Mismatch);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("significant roof area discrepancy")));
        assert!(report.overall_consistency_score < 0.5);
    }

    #[test]
    fn test_mismatch_confidence_penalized() {
        let estimate = estimate_with_items(
            vec![LineItem::new("Laminated shingles", 40.0, "SQ")],
            0.8,
        );
        let roof = roof_with_area(3250.0, 0.9);

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, Some(&roof));
        let area_point = &report.comparison_points[0];

        let expected = 0.8_f64.min(0.9) * MISMATCH_CONFIDENCE_FACTOR;
        assert!((area_point.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_both_missing_is_needs_verification() {
        let estimate = estimate_with_items(Vec::new(), 0.0);
        let roof = RoofMeasurementRecord::empty("nothing", FieldSource::Text);

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, Some(&roof));

        for point in &report.comparison_points {
            assert_eq!(point.status, ComparisonStatus::NeedsVerification);
            assert!((point.confidence - NEEDS_VERIFICATION_CONFIDENCE).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_always_in_bounds() {
        let cases = vec![
            (estimate_with_items(Vec::new(), 0.0), None),
            (
                estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")], 0.95),
                Some(roof_with_area(3250.0, 0.95)),
            ),
            (
                estimate_with_items(vec![LineItem::new("Shingles", 80.0, "SQ")], 0.95),
                Some(roof_with_area(3250.0, 0.95)),
            ),
        ];

        for (estimate, roof) in cases {
            let report = DiscrepancyEngine::new().analyze("job-1", &estimate, roof.as_ref());
            assert!(
                (0.05..=0.95).contains(&report.overall_consistency_score),
                "score {} out of bounds",
                report.overall_consistency_score
            );
        }
    }

    #[test]
    fn test_missing_roof_record_degrades_gracefully() {
        let estimate = estimate_with_items(
            vec![
                LineItem::new("Laminated shingles", 32.5, "SQ"),
                LineItem::new("Asphalt starter course", 150.0, "LF"),
            ],
            0.9,
        );

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, None);

        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("no roof report")));
        let area_point = &report.comparison_points[0];
        assert_eq!(area_point.status, ComparisonStatus::MissingInRoof);
    }

    #[test]
    fn test_eave_comparison_uses_starter_items() {
        let estimate = estimate_with_items(
            vec![LineItem::new("Asphalt starter course - universal", 150.0, "LF")],
            0.9,
        );
        let mut roof = roof_with_area(3250.0, 0.9);
        roof.eave_length_ft = ExtractedField::new(150.0, 0.88, "table", FieldSource::Text);

        let report = DiscrepancyEngine::new().analyze("job-1", &estimate, Some(&roof));
        let eave_point = report
            .comparison_points
            .iter()
            .find(|p| p.field == "eave_length_ft")
            .unwrap();
        assert_eq!(eave_point.status, ComparisonStatus::Match);
    }

    #[tokio::test]
    async fn test_discrepancy_stage_contract() {
        let input = DiscrepancyInput {
            estimate: estimate_with_items(
                vec![LineItem::new("Laminated shingles", 32.5, "SQ")],
                0.9,
            ),
            roof: Some(roof_with_area(3250.0, 0.9)),
        };
        let stage = DiscrepancyStage::new();
        let ctx = TaskContext::new("job-1", "discrepancy-task");

        let result = execute_stage(&stage, &input, &ctx).await.unwrap();
        assert_eq!(result.data.job_id, "job-1");
        assert!(result.validation.is_valid);
        assert_eq!(result.attempts, 1);
    }
}
