//! Supervisor
//!
//! Final quality gate: a second, independent pass over the orchestrator's
//! output. Maps the domain records into the review crate's check input,
//! runs the rule checks, and optionally adds an LLM narrative re-review.
//! Produces the terminal report with the final status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use claimlens_core::{
    CoreResult, PipelineStage, StageConfig, StagePlan, StageResult, TaskContext, ValidationResult,
};
use claimlens_llm::{CompletionRequest, LlmProvider};
use claimlens_review::{
    FieldSummary, NumericCrossCheck, ReviewInput, ReviewPipeline, ReviewReport,
};
use tracing::{debug, warn};

use crate::models::{JobOutcome, SQFT_PER_SQUARE};
use crate::services::discrepancy::RATIO_WARN;
use crate::services::prompt::{render_prompt, PromptConfigSource};

/// Confidence floor for mandatory estimate fields.
const MANDATORY_CONFIDENCE_FLOOR: f64 = 0.4;

/// Confidence floor for optional fields.
const OPTIONAL_CONFIDENCE_FLOOR: f64 = 0.3;

/// The supervisor stage.
pub struct Supervisor {
    config: StageConfig,
    pipeline: ReviewPipeline,
    narrative: Option<NarrativeReviewer>,
}

/// Optional LLM-backed narrative re-review.
struct NarrativeReviewer {
    provider: Arc<dyn LlmProvider>,
    prompts: Arc<dyn PromptConfigSource>,
}

impl Supervisor {
    /// Supervisor with rule checks only.
    pub fn new() -> Self {
        Self {
            config: StageConfig::new("supervision")
                .with_max_retries(0)
                .with_confidence_threshold(0.2),
            pipeline: ReviewPipeline::new(),
            narrative: None,
        }
    }

    /// Enable the narrative re-review.
    pub fn with_narrative(
        mut self,
        provider: Arc<dyn LlmProvider>,
        prompts: Arc<dyn PromptConfigSource>,
    ) -> Self {
        self.narrative = Some(NarrativeReviewer { provider, prompts });
        self
    }

    /// Map the orchestrator outcome into the review crate's input view.
    fn build_review_input(outcome: &JobOutcome) -> ReviewInput {
        let mut fields = Vec::new();
        let mut stage_confidences = Vec::new();
        let mut cross_checks = Vec::new();

        if let Some(estimate) = &outcome.estimate {
            let record = &estimate.data;
            stage_confidences.push((
                "estimate_extraction".to_string(),
                estimate.validation.confidence,
            ));

            fields.push(
                FieldSummary::new(
                    "claim_number",
                    record.claim_number.is_present(),
                    record.claim_number.confidence,
                )
                .mandatory()
                .with_floor(MANDATORY_CONFIDENCE_FLOOR),
            );
            fields.push(
                FieldSummary::new(
                    "property_address",
                    record.property_address.is_present(),
                    record.property_address.confidence,
                )
                .mandatory()
                .with_floor(MANDATORY_CONFIDENCE_FLOOR),
            );
            fields.push(
                FieldSummary::new(
                    "total_rcv",
                    record.total_rcv.is_present(),
                    record.total_rcv.confidence,
                )
                .mandatory()
                .with_floor(MANDATORY_CONFIDENCE_FLOOR),
            );
            for (name, field_present, confidence) in [
                ("carrier", record.carrier.is_present(), record.carrier.confidence),
                (
                    "date_of_loss",
                    record.date_of_loss.is_present(),
                    record.date_of_loss.confidence,
                ),
                (
                    "total_acv",
                    record.total_acv.is_present(),
                    record.total_acv.confidence,
                ),
                (
                    "deductible",
                    record.deductible.is_present(),
                    record.deductible.confidence,
                ),
            ] {
                fields.push(
                    FieldSummary::new(name, field_present, confidence)
                        .with_floor(OPTIONAL_CONFIDENCE_FLOOR),
                );
            }
            fields.push(
                FieldSummary::new(
                    "line_items",
                    !record.items().is_empty(),
                    record.line_items.confidence,
                )
                .with_floor(OPTIONAL_CONFIDENCE_FLOOR),
            );

            // Cross-record numeric sanity: implied area vs reported area.
            if let Some(roof) = &outcome.roof {
                let implied_area = record.total_quantity_for_unit("SQ") * SQFT_PER_SQUARE;
                cross_checks.push(NumericCrossCheck {
                    name: "roof area".to_string(),
                    left_label: "estimate line items (sq ft)".to_string(),
                    left: (implied_area > 0.0).then_some(implied_area),
                    right_label: "roof report (sq ft)".to_string(),
                    right: roof.data.total_area_sqft.value,
                    warn_ratio: RATIO_WARN,
                });
            }
        }

        if let Some(roof) = &outcome.roof {
            stage_confidences.push(("roof_extraction".to_string(), roof.validation.confidence));
            fields.push(
                FieldSummary::new(
                    "total_area_sqft",
                    roof.data.total_area_sqft.is_present(),
                    roof.data.total_area_sqft.confidence,
                )
                .with_floor(OPTIONAL_CONFIDENCE_FLOOR),
            );
            fields.push(
                FieldSummary::new(
                    "eave_length_ft",
                    roof.data.eave_length_ft.is_present(),
                    roof.data.eave_length_ft.confidence,
                )
                .with_floor(OPTIONAL_CONFIDENCE_FLOOR),
            );
        }

        if let Some(discrepancy) = &outcome.discrepancy {
            stage_confidences.push((
                "discrepancy_analysis".to_string(),
                discrepancy.overall_consistency_score,
            ));
        }

        ReviewInput {
            job_id: outcome.job_id.clone(),
            orchestrator_status: outcome.status,
            fatal_error_count: outcome.fatal_error_count(),
            error_count: outcome.errors.len(),
            warning_count: outcome.warnings.len(),
            stage_confidences,
            fields,
            cross_checks,
            consistency_score: outcome
                .discrepancy
                .as_ref()
                .map(|d| d.overall_consistency_score),
            recommendation_count: outcome.recommendations.len(),
        }
    }

    /// Plain-text summary of the outcome for the narrative prompt.
    fn outcome_summary(outcome: &JobOutcome, report: &ReviewReport) -> String {
        let mut lines = vec![
            format!("Job {} finished with status {}", outcome.job_id, outcome.status),
            format!(
                "Errors: {} ({} fatal); warnings: {}",
                outcome.errors.len(),
                outcome.fatal_error_count(),
                outcome.warnings.len()
            ),
            format!("Recommendations: {}", outcome.recommendations.len()),
        ];
        if let Some(discrepancy) = &outcome.discrepancy {
            lines.push(format!(
                "Cross-document consistency: {:.2}",
                discrepancy.overall_consistency_score
            ));
        }
        for issue in &report.issues {
            lines.push(format!("{}: {}", issue.severity, issue.message));
        }
        lines.join("\n")
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for Supervisor {
    type Input = JobOutcome;
    type Output = ReviewReport;

    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn plan(&self, _input: &JobOutcome, _ctx: &TaskContext) -> CoreResult<StagePlan> {
        let mut plan = StagePlan::single("run review checks", 20, 0.95);
        if self.narrative.is_some() {
            plan = plan.with_subtask("narrative re-review", 5_000, 0.7);
        }
        Ok(plan)
    }

    async fn act(
        &self,
        input: &JobOutcome,
        ctx: &TaskContext,
    ) -> CoreResult<StageResult<ReviewReport>> {
        let started = Instant::now();

        let review_input = Self::build_review_input(input);
        let mut report = self.pipeline.review(&review_input);

        // The narrative pass is advisory; its failure never blocks the checks.
        if let Some(reviewer) = &self.narrative {
            let step = reviewer.prompts.step_config("supervisor.narrative");
            let mut vars = HashMap::new();
            vars.insert("summary", Self::outcome_summary(input, &report));
            let prompt = render_prompt(&step.prompt, &vars);

            let request = CompletionRequest::text(prompt)
                .with_max_tokens(step.max_tokens)
                .with_temperature(step.temperature);
            match reviewer.provider.complete(request).await {
                Ok(response) => {
                    let notes = response.content.trim();
                    if !notes.is_empty() {
                        report.suggestions.push(format!("Reviewer notes: {notes}"));
                    }
                }
                Err(e) => {
                    warn!(job_id = %ctx.job_id, error = %e, "narrative re-review unavailable");
                }
            }
        }

        debug!(job_id = %ctx.job_id, status = %report.final_status, "supervision complete");

        let validation = ValidationResult::valid(report.overall_confidence);
        Ok(StageResult::new(
            report,
            validation,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn validate(
        &self,
        result: &StageResult<ReviewReport>,
        _ctx: &TaskContext,
    ) -> CoreResult<ValidationResult> {
        let mut validation = ValidationResult::valid(result.data.overall_confidence);
        for issue in result.data.critical_issues() {
            validation = validation.with_warning(issue.message.clone());
        }
        Ok(validation)
    }
}
