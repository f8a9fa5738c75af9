//! Recommendation Rules
//!
//! A declarative table of condition/action rules evaluated against the fused
//! records to recommend missing or insufficient supplement line items. Rules
//! are pure functions over an immutable context, evaluated independently in
//! registration order with no conflict resolution; adding a rule means
//! appending to `builtin_rules`.

use std::time::Instant;

use async_trait::async_trait;
use claimlens_core::{
    CoreResult, ExtractedField, PipelineStage, StageConfig, StagePlan, StageResult, TaskContext,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{
    DiscrepancyReport, EstimateRecord, RecommendationCategory, RecommendationPriority,
    RoofMeasurementRecord, SupplementRecommendation,
};

/// Inferred quantities inherit the source field's confidence times this
/// discount, reflecting inferential uncertainty.
pub const INFERENCE_DISCOUNT: f64 = 0.9;

/// Pitch rise (in /12 notation) at or above which steep-pitch labor applies.
const STEEP_PITCH_RISE: u32 = 7;

/// Immutable context a rule evaluates against.
pub struct RuleContext<'a> {
    /// Fused estimate record
    pub estimate: &'a EstimateRecord,
    /// Fused roof record, when available
    pub roof: Option<&'a RoofMeasurementRecord>,
    /// Discrepancy report, when the engine ran
    pub discrepancy: Option<&'a DiscrepancyReport>,
}

/// One recommendation rule.
pub struct Rule {
    /// Stable identifier, also used as the recommendation id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Priority assigned to recommendations this rule produces
    pub priority: RecommendationPriority,
    /// Whether the rule applies
    pub condition: fn(&RuleContext) -> bool,
    /// Build the recommendation; `None` when quantities turn out unusable
    pub action: fn(&RuleContext) -> Option<SupplementRecommendation>,
}

/// The built-in rule table, in evaluation order.
pub fn builtin_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "starter-shingles",
            name: "Starter shingles from eave length",
            priority: RecommendationPriority::High,
            condition: |ctx| {
                roof_length(ctx, |r| &r.eave_length_ft).is_some()
                    && !mentions(ctx.estimate, &["starter"])
            },
            action: starter_shingles,
        },
        Rule {
            id: "drip-edge",
            name: "Drip edge from eave and rake length",
            priority: RecommendationPriority::Medium,
            condition: |ctx| {
                roof_length(ctx, |r| &r.eave_length_ft).is_some()
                    && roof_length(ctx, |r| &r.rake_length_ft).is_some()
                    && !mentions(ctx.estimate, &["drip edge", "drip-edge"])
            },
            action: drip_edge,
        },
        Rule {
            id: "ridge-cap",
            name: "Ridge cap from ridge/hip length",
            priority: RecommendationPriority::High,
            condition: |ctx| {
                roof_length(ctx, |r| &r.ridge_hip_length_ft).is_some()
                    && !mentions(ctx.estimate, &["ridge cap", "ridge vent", "hip/ridge"])
            },
            action: ridge_cap,
        },
        Rule {
            id: "valley-ice-water",
            name: "Ice & water barrier from valley length",
            priority: RecommendationPriority::Medium,
            condition: |ctx| {
                roof_length(ctx, |r| &r.valley_length_ft).is_some()
                    && !mentions(ctx.estimate, &["valley", "ice & water", "ice and water"])
            },
            action: valley_ice_water,
        },
        Rule {
            id: "steep-pitch-labor",
            name: "Steep-pitch labor from predominant pitch",
            priority: RecommendationPriority::Medium,
            condition: |ctx| {
                ctx.roof
                    .and_then(|r| r.pitch_rise())
                    .map(|rise| rise >= STEEP_PITCH_RISE)
                    .unwrap_or(false)
                    && ctx.roof.and_then(|r| r.total_area_squares()).is_some()
                    && !mentions(ctx.estimate, &["steep"])
            },
            action: steep_pitch_labor,
        },
    ]
}

fn mentions(estimate: &EstimateRecord, keywords: &[&str]) -> bool {
    estimate.items().iter().any(|item| item.mentions_any(keywords))
}

fn roof_length<'a>(
    ctx: &RuleContext<'a>,
    field: impl Fn(&'a RoofMeasurementRecord) -> &'a ExtractedField<f64>,
) -> Option<(f64, f64)> {
    let record = ctx.roof?;
    let extracted = field(record);
    extracted.value.filter(|v| *v > 0.0).map(|v| (v, extracted.confidence))
}

fn starter_shingles(ctx: &RuleContext) -> Option<SupplementRecommendation> {
    let roof = ctx.roof?;
    let (length, confidence) = roof_length(ctx, |r| &r.eave_length_ft)?;
    let quantity = ExtractedField {
        value: Some(length),
        confidence,
        rationale: roof.eave_length_ft.rationale.clone(),
        source: roof.eave_length_ft.source,
        attempts: roof.eave_length_ft.attempts,
    };

    Some(
        SupplementRecommendation::new(
            "starter-shingles",
            "Asphalt starter course - universal starter",
            quantity,
            "LF",
            "roof report shows eave length but the estimate has no starter line item",
            confidence * INFERENCE_DISCOUNT,
            RecommendationCategory::Material,
            RecommendationPriority::High,
        )
        .with_evidence(vec![format!("roof report eave length: {length:.0} LF")]),
    )
}

fn drip_edge(ctx: &RuleContext) -> Option<SupplementRecommendation> {
    let (eave, eave_conf) = roof_length(ctx, |r| &r.eave_length_ft)?;
    let (rake, rake_conf) = roof_length(ctx, |r| &r.rake_length_ft)?;
    let confidence = eave_conf.min(rake_conf);
    let total = eave + rake;

    let quantity = ExtractedField::new(
        total,
        confidence,
        "sum of report eave and rake lengths",
        ctx.roof?.eave_length_ft.source,
    );

    Some(
        SupplementRecommendation::new(
            "drip-edge",
            "Drip edge - aluminum",
            quantity,
            "LF",
            "eave and rake lengths are known but the estimate has no drip edge line item",
            confidence * INFERENCE_DISCOUNT,
            RecommendationCategory::Material,
            RecommendationPriority::Medium,
        )
        .with_evidence(vec![
            format!("roof report eave length: {eave:.0} LF"),
            format!("roof report rake length: {rake:.0} LF"),
        ]),
    )
}

fn ridge_cap(ctx: &RuleContext) -> Option<SupplementRecommendation> {
    let roof = ctx.roof?;
    let (length, confidence) = roof_length(ctx, |r| &r.ridge_hip_length_ft)?;
    let quantity = ExtractedField::new(
        length,
        confidence,
        roof.ridge_hip_length_ft.rationale.clone(),
        roof.ridge_hip_length_ft.source,
    );

    Some(
        SupplementRecommendation::new(
            "ridge-cap",
            "Hip/ridge cap - standard profile",
            quantity,
            "LF",
            "roof report shows ridge/hip length but the estimate has no ridge cap line item",
            confidence * INFERENCE_DISCOUNT,
            RecommendationCategory::Material,
            RecommendationPriority::High,
        )
        .with_evidence(vec![format!("roof report ridge/hip length: {length:.0} LF")]),
    )
}

fn valley_ice_water(ctx: &RuleContext) -> Option<SupplementRecommendation> {
    let roof = ctx.roof?;
    let (length, confidence) = roof_length(ctx, |r| &r.valley_length_ft)?;
    let quantity = ExtractedField::new(
        length,
        confidence,
        roof.valley_length_ft.rationale.clone(),
        roof.valley_length_ft.source,
    );

    Some(
        SupplementRecommendation::new(
            "valley-ice-water",
            "Ice & water barrier - valleys",
            quantity,
            "LF",
            "roof report shows valley length but the estimate has no valley protection line item",
            confidence * INFERENCE_DISCOUNT,
            RecommendationCategory::Code,
            RecommendationPriority::Medium,
        )
        .with_evidence(vec![format!("roof report valley length: {length:.0} LF")]),
    )
}

fn steep_pitch_labor(ctx: &RuleContext) -> Option<SupplementRecommendation> {
    let roof = ctx.roof?;
    let squares = roof.total_area_squares()?;
    let rise = roof.pitch_rise()?;
    let confidence = roof.pitch.confidence.min(roof.total_area_sqft.confidence);

    let quantity = ExtractedField::new(
        squares,
        confidence,
        "report total area, in squares",
        roof.total_area_sqft.source,
    );

    Some(
        SupplementRecommendation::new(
            "steep-pitch-labor",
            format!("Additional charge for steep roof - {rise}/12 and over"),
            quantity,
            "SQ",
            "predominant pitch meets the steep threshold but no steep charge is on the estimate",
            confidence * INFERENCE_DISCOUNT,
            RecommendationCategory::Labor,
            RecommendationPriority::Medium,
        )
        .with_evidence(vec![
            format!("roof report pitch: {rise}/12"),
            format!("roof report area: {squares:.1} SQ"),
        ]),
    )
}

/// The recommendation engine: evaluates the rule table against a context.
pub struct RecommendationEngine {
    rules: Vec<Rule>,
}

impl RecommendationEngine {
    /// Engine with the built-in rule table.
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }

    /// Engine with a custom rule table.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Evaluate every rule independently, in registration order.
    pub fn evaluate(&self, ctx: &RuleContext) -> Vec<SupplementRecommendation> {
        let mut recommendations = Vec::new();
        for rule in &self.rules {
            if !(rule.condition)(ctx) {
                continue;
            }
            match (rule.action)(ctx) {
                Some(recommendation) => {
                    debug!(rule = rule.id, "rule triggered");
                    recommendations.push(recommendation);
                }
                None => {
                    debug!(rule = rule.id, "rule condition held but action produced nothing");
                }
            }
        }
        info!(count = recommendations.len(), "recommendation evaluation complete");
        recommendations
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Input to the recommendation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationInput {
    /// Fused estimate record
    pub estimate: EstimateRecord,
    /// Fused roof record, when available
    pub roof: Option<RoofMeasurementRecord>,
    /// Discrepancy report, when the engine ran
    pub discrepancy: Option<DiscrepancyReport>,
}

/// The recommendation engine wrapped in the standard stage contract.
pub struct RecommendationStage {
    config: StageConfig,
    engine: RecommendationEngine,
}

impl RecommendationStage {
    /// Create the stage with the built-in rules.
    pub fn new() -> Self {
        Self {
            config: StageConfig::new("recommendation_generation")
                .with_max_retries(0)
                .with_confidence_threshold(0.2),
            engine: RecommendationEngine::new(),
        }
    }
}

impl Default for RecommendationStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for RecommendationStage {
    type Input = RecommendationInput;
    type Output = Vec<SupplementRecommendation>;

    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn plan(&self, _input: &RecommendationInput, _ctx: &TaskContext) -> CoreResult<StagePlan> {
        Ok(StagePlan::single("evaluate supplement rule table", 10, 0.95))
    }

    async fn act(
        &self,
        input: &RecommendationInput,
        _ctx: &TaskContext,
    ) -> CoreResult<StageResult<Vec<SupplementRecommendation>>> {
        let started = Instant::now();
        let ctx = RuleContext {
            estimate: &input.estimate,
            roof: input.roof.as_ref(),
            discrepancy: input.discrepancy.as_ref(),
        };
        let recommendations = self.engine.evaluate(&ctx);
        let validation = assess(&recommendations);

        Ok(StageResult::new(
            recommendations,
            validation,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn validate(
        &self,
        result: &StageResult<Vec<SupplementRecommendation>>,
        _ctx: &TaskContext,
    ) -> CoreResult<ValidationResult> {
        Ok(assess(&result.data))
    }
}

/// An empty recommendation list is a legitimate outcome; confidence reflects
/// the mean of the produced recommendations otherwise.
fn assess(recommendations: &[SupplementRecommendation]) -> ValidationResult {
    if recommendations.is_empty() {
        return ValidationResult::valid(0.8).with_warning("no supplement recommendations produced");
    }
    let mean = recommendations.iter().map(|r| r.confidence).sum::<f64>()
        / recommendations.len() as f64;
    ValidationResult::valid(mean)
}

#[cfg(test)]
mod tests {
    use claimlens_core::FieldSource;

    use super::*;
    use crate::models::LineItem;

    fn estimate_with_items(items: Vec<LineItem>) -> EstimateRecord {
        let mut record = EstimateRecord::empty("test", FieldSource::Text);
        record.line_items = ExtractedField::new(items, 0.9, "parsed table", FieldSource::Text);
        record
    }

    fn roof_with_eave(eave: f64, confidence: f64) -> RoofMeasurementRecord {
        let mut record = RoofMeasurementRecord::empty("test", FieldSource::Text);
        record.eave_length_ft =
            ExtractedField::new(eave, confidence, "measurement table", FieldSource::Text);
        record
    }

    #[test]
    fn test_starter_rule_emits_single_recommendation() {
        // Eave length 150 in the roof report; no starter item on the estimate.
        let estimate = estimate_with_items(vec![
            LineItem::new("Remove & replace laminated shingles", 32.5, "SQ"),
            LineItem::new("Drip edge - aluminum", 120.0, "LF"),
        ]);
        let roof = roof_with_eave(150.0, 0.9);

        let engine = RecommendationEngine::new();
        let recommendations = engine.evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });

        let starters: Vec<_> = recommendations
            .iter()
            .filter(|r| r.id == "starter-shingles")
            .collect();
        assert_eq!(starters.len(), 1);
        assert_eq!(starters[0].quantity.value, Some(150.0));
        assert_eq!(starters[0].unit, "LF");
        assert!((starters[0].confidence - 0.9 * INFERENCE_DISCOUNT).abs() < 1e-9);
    }

    #[test]
    fn test_starter_rule_silent_when_item_exists() {
        let estimate = estimate_with_items(vec![LineItem::new(
            "Asphalt starter course - universal",
            150.0,
            "LF",
        )]);
        let roof = roof_with_eave(150.0, 0.9);

        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });
        assert!(recommendations.iter().all(|r| r.id != "starter-shingles"));
    }

    #[test]
    fn test_no_roof_record_no_recommendations() {
        let estimate = estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]);
        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: None,
            discrepancy: None,
        });
        assert!(recommendations.is_empty());
    }

    #[test]
    fn test_steep_pitch_rule() {
        let estimate = estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]);
        let mut roof = roof_with_eave(150.0, 0.9);
        roof.pitch = ExtractedField::new("8/12".to_string(), 0.8, "diagram", FieldSource::Text);
        roof.total_area_sqft = ExtractedField::new(3250.0, 0.9, "summary", FieldSource::Text);

        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });

        let steep = recommendations
            .iter()
            .find(|r| r.id == "steep-pitch-labor")
            .expect("steep pitch rule should trigger");
        assert_eq!(steep.unit, "SQ");
        assert_eq!(steep.quantity.value, Some(32.5));
    }

    #[test]
    fn test_shallow_pitch_does_not_trigger() {
        let estimate = estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]);
        let mut roof = roof_with_eave(150.0, 0.9);
        roof.pitch = ExtractedField::new("4/12".to_string(), 0.8, "diagram", FieldSource::Text);
        roof.total_area_sqft = ExtractedField::new(3250.0, 0.9, "summary", FieldSource::Text);

        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });
        assert!(recommendations.iter().all(|r| r.id != "steep-pitch-labor"));
    }

    #[test]
    fn test_rules_evaluated_in_registration_order() {
        let estimate = estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]);
        let mut roof = roof_with_eave(150.0, 0.9);
        roof.rake_length_ft = ExtractedField::new(110.0, 0.85, "table", FieldSource::Text);
        roof.ridge_hip_length_ft = ExtractedField::new(62.0, 0.85, "table", FieldSource::Text);

        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });

        let ids: Vec<&str> = recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["starter-shingles", "drip-edge", "ridge-cap"]);
    }

    #[test]
    fn test_drip_edge_sums_eave_and_rake() {
        let estimate = estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]);
        let mut roof = roof_with_eave(150.0, 0.9);
        roof.rake_length_ft = ExtractedField::new(110.0, 0.8, "table", FieldSource::Text);

        let recommendations = RecommendationEngine::new().evaluate(&RuleContext {
            estimate: &estimate,
            roof: Some(&roof),
            discrepancy: None,
        });

        let drip = recommendations.iter().find(|r| r.id == "drip-edge").unwrap();
        assert_eq!(drip.quantity.value, Some(260.0));
        // Confidence discounts off the weaker of the two inputs.
        assert!((drip.confidence - 0.8 * INFERENCE_DISCOUNT).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommendation_stage_contract() {
        let input = RecommendationInput {
            estimate: estimate_with_items(vec![LineItem::new("Shingles", 32.5, "SQ")]),
            roof: Some(roof_with_eave(150.0, 0.9)),
            discrepancy: None,
        };
        let stage = RecommendationStage::new();
        let ctx = TaskContext::new("job-1", "recommendation-task");

        let result = claimlens_core::execute_stage(&stage, &input, &ctx).await.unwrap();
        assert!(!result.data.is_empty());
        assert!(result.validation.is_valid);
    }
}
