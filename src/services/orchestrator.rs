//! Pipeline Orchestrator
//!
//! Sequences the pipeline stages respecting their data dependencies:
//! estimate and roof extraction are independent and run concurrently;
//! discrepancy analysis requires estimate data (roof data is optional);
//! recommendation generation follows discrepancy. Individual stage failures
//! are recorded and do not stop independent stages; missing prerequisites
//! skip dependent stages with an explicit recorded reason.

use std::sync::Arc;

use claimlens_core::{execute_stage, JobStatus, PipelineStage, TaskContext};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    ErrorCategory, EstimateRecord, EventLevel, JobError, JobOutcome, RoofMeasurementRecord,
    SkippedStage,
};
use crate::services::discrepancy::{DiscrepancyInput, DiscrepancyStage};
use crate::services::extraction::DocumentInput;
use crate::services::rules::{RecommendationInput, RecommendationStage};
use crate::storage::JobSink;

/// Consistency score below which a job-level warning is recorded.
const LOW_CONSISTENCY_WARNING_THRESHOLD: f64 = 0.5;

/// One job's worth of input documents.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Caller-supplied job id; generated when absent
    pub job_id: Option<String>,
    /// The damage estimate (required)
    pub estimate_document: DocumentInput,
    /// The roof measurement report (optional)
    pub roof_document: Option<DocumentInput>,
}

impl JobRequest {
    /// Request with an estimate only.
    pub fn new(estimate_document: DocumentInput) -> Self {
        Self {
            job_id: None,
            estimate_document,
            roof_document: None,
        }
    }

    /// Attach a roof document.
    pub fn with_roof_document(mut self, document: DocumentInput) -> Self {
        self.roof_document = Some(document);
        self
    }

    /// Pin the job id.
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// The orchestrator, generic over the two extraction stages so tests can
/// substitute doubles while production wires in the real agents.
pub struct Orchestrator<E, R>
where
    E: PipelineStage<Input = DocumentInput, Output = EstimateRecord>,
    R: PipelineStage<Input = DocumentInput, Output = RoofMeasurementRecord>,
{
    estimate_agent: E,
    roof_agent: R,
    discrepancy_stage: DiscrepancyStage,
    recommendation_stage: RecommendationStage,
    sink: Option<Arc<dyn JobSink>>,
}

impl<E, R> Orchestrator<E, R>
where
    E: PipelineStage<Input = DocumentInput, Output = EstimateRecord>,
    R: PipelineStage<Input = DocumentInput, Output = RoofMeasurementRecord>,
{
    /// Create an orchestrator without persistence.
    pub fn new(estimate_agent: E, roof_agent: R) -> Self {
        Self {
            estimate_agent,
            roof_agent,
            discrepancy_stage: DiscrepancyStage::new(),
            recommendation_stage: RecommendationStage::new(),
            sink: None,
        }
    }

    /// Attach a persistence sink for status transitions and events.
    pub fn with_sink(mut self, sink: Arc<dyn JobSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run one job end to end. Never returns an error: every failure is
    /// recorded on the outcome, and an unexpected orchestrator failure is
    /// converted into a critical error with a `Failed` status.
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        let job_id = request
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut outcome = JobOutcome::started(&job_id);

        info!(job_id = %job_id, "job started");
        self.persist(&outcome);
        self.emit(&job_id, "orchestrator", EventLevel::Info, "job started");

        // Top-level catch: anything run_pipeline could not handle locally is
        // recorded as a critical failure rather than propagated.
        if let Err(e) = self.run_pipeline(&job_id, &request, &mut outcome).await {
            error!(job_id = %job_id, error = %e, "critical orchestrator failure");
            self.emit(&job_id, "orchestrator", EventLevel::Error, &e.to_string());
            outcome
                .errors
                .push(JobError::critical("orchestrator", e.to_string()));
        }

        outcome.status = derive_status(&outcome);

        // A critical failure marks the whole job failed regardless of what
        // earlier stages managed to produce.
        if outcome
            .errors
            .iter()
            .any(|e| e.category == ErrorCategory::Critical)
        {
            outcome.status = JobStatus::Failed;
        }

        // A non-completed status must explain itself.
        if outcome.status != JobStatus::Completed && outcome.errors.is_empty() {
            outcome.warnings.push(
                "internal inconsistency: non-completed status with an empty error list".to_string(),
            );
        }

        outcome.finished_at = Some(chrono::Utc::now());
        self.persist(&outcome);
        self.emit(
            &job_id,
            "orchestrator",
            EventLevel::Info,
            &format!("job finished with status {}", outcome.status),
        );
        info!(job_id = %job_id, status = %outcome.status, errors = outcome.errors.len(), "job finished");

        outcome
    }

    async fn run_pipeline(
        &self,
        job_id: &str,
        request: &JobRequest,
        outcome: &mut JobOutcome,
    ) -> claimlens_core::CoreResult<()> {
        let root_ctx = TaskContext::new(job_id, format!("{job_id}:root"));

        // Estimate and roof extraction share no data; run them concurrently.
        let estimate_ctx = root_ctx.child(format!("{job_id}:estimate"));
        let roof_ctx = root_ctx.child(format!("{job_id}:roof"));

        let estimate_fut = execute_stage(&self.estimate_agent, &request.estimate_document, &estimate_ctx);
        let roof_fut = async {
            match &request.roof_document {
                Some(document) => Some(execute_stage(&self.roof_agent, document, &roof_ctx).await),
                None => None,
            }
        };
        let (estimate_result, roof_result) = tokio::join!(estimate_fut, roof_fut);

        match estimate_result {
            Ok(result) => {
                self.record_stage_outcome(job_id, "estimate_extraction", &result.validation, outcome);
                outcome.estimate = Some(result);
            }
            Err(e) => {
                error!(job_id, error = %e, "estimate extraction failed");
                self.emit(job_id, "estimate_extraction", EventLevel::Error, &e.to_string());
                outcome
                    .errors
                    .push(JobError::extraction("estimate_extraction", e.to_string()));
            }
        }

        match roof_result {
            None => {
                outcome.skipped.push(SkippedStage {
                    stage: "roof_extraction".to_string(),
                    reason: "no roof document supplied".to_string(),
                });
                self.emit(
                    job_id,
                    "roof_extraction",
                    EventLevel::Info,
                    "skipped: no roof document supplied",
                );
            }
            Some(Ok(result)) => {
                self.record_stage_outcome(job_id, "roof_extraction", &result.validation, outcome);
                outcome.roof = Some(result);
            }
            Some(Err(e)) => {
                error!(job_id, error = %e, "roof extraction failed");
                self.emit(job_id, "roof_extraction", EventLevel::Error, &e.to_string());
                outcome
                    .errors
                    .push(JobError::extraction("roof_extraction", e.to_string()));
            }
        }

        // Downstream stages need estimate data; without it they are skipped
        // with a recorded reason, never silently omitted.
        if !outcome.has_estimate_data() {
            for stage in ["discrepancy_analysis", "recommendation_generation"] {
                outcome.skipped.push(SkippedStage {
                    stage: stage.to_string(),
                    reason: "estimate extraction produced no usable data".to_string(),
                });
                outcome.errors.push(JobError::orchestration(
                    stage,
                    "prerequisite estimate data missing",
                ));
                self.emit(
                    job_id,
                    stage,
                    EventLevel::Warning,
                    "skipped: estimate extraction produced no usable data",
                );
            }
            return Ok(());
        }

        let estimate_record = outcome
            .estimate
            .as_ref()
            .map(|r| r.data.clone())
            .ok_or_else(|| {
                claimlens_core::CoreError::internal("estimate presence invariant violated")
            })?;
        let roof_record = outcome
            .roof
            .as_ref()
            .filter(|r| r.data.has_usable_data())
            .map(|r| r.data.clone());

        // Discrepancy analysis (roof data optional).
        let discrepancy_ctx = root_ctx.child(format!("{job_id}:discrepancy"));
        let discrepancy_input = DiscrepancyInput {
            estimate: estimate_record.clone(),
            roof: roof_record.clone(),
        };
        match execute_stage(&self.discrepancy_stage, &discrepancy_input, &discrepancy_ctx).await {
            Ok(result) => {
                let report = result.data;
                if report.overall_consistency_score < LOW_CONSISTENCY_WARNING_THRESHOLD {
                    outcome.warnings.push(format!(
                        "low cross-document consistency: {:.2}",
                        report.overall_consistency_score
                    ));
                }
                outcome.warnings.extend(report.warnings.iter().cloned());
                self.emit(
                    job_id,
                    "discrepancy_analysis",
                    EventLevel::Info,
                    &format!("consistency {:.2}", report.overall_consistency_score),
                );
                outcome.discrepancy = Some(report);
            }
            Err(e) => {
                error!(job_id, error = %e, "discrepancy analysis failed");
                self.emit(job_id, "discrepancy_analysis", EventLevel::Error, &e.to_string());
                outcome
                    .errors
                    .push(JobError::extraction("discrepancy_analysis", e.to_string()));
            }
        }

        // Recommendation generation.
        let recommendation_ctx = root_ctx.child(format!("{job_id}:recommendation"));
        let recommendation_input = RecommendationInput {
            estimate: estimate_record,
            roof: roof_record,
            discrepancy: outcome.discrepancy.clone(),
        };
        match execute_stage(&self.recommendation_stage, &recommendation_input, &recommendation_ctx)
            .await
        {
            Ok(result) => {
                self.emit(
                    job_id,
                    "recommendation_generation",
                    EventLevel::Info,
                    &format!("{} recommendation(s)", result.data.len()),
                );
                outcome.recommendations = result.data;
            }
            Err(e) => {
                error!(job_id, error = %e, "recommendation generation failed");
                self.emit(job_id, "recommendation_generation", EventLevel::Error, &e.to_string());
                outcome.errors.push(JobError::extraction(
                    "recommendation_generation",
                    e.to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Record a finished stage's validation on the job outcome.
    fn record_stage_outcome(
        &self,
        job_id: &str,
        stage: &str,
        validation: &claimlens_core::ValidationResult,
        outcome: &mut JobOutcome,
    ) {
        if validation.is_valid {
            self.emit(
                job_id,
                stage,
                EventLevel::Info,
                &format!("completed with confidence {:.2}", validation.confidence),
            );
        } else {
            // The data is kept; the shortfall is recorded as a non-fatal
            // validation error for downstream inspection.
            for error in &validation.errors {
                outcome.errors.push(JobError::validation(stage, error.clone()));
            }
            self.emit(
                job_id,
                stage,
                EventLevel::Warning,
                "completed below validation threshold",
            );
        }
        for warning in &validation.warnings {
            outcome.warnings.push(format!("{stage}: {warning}"));
        }
    }

    /// Best-effort persistence; the pipeline never blocks on the sink.
    fn persist(&self, outcome: &JobOutcome) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record_status(
                &outcome.job_id,
                outcome.status,
                outcome.errors.len(),
                outcome.warnings.len(),
            ) {
                warn!(job_id = %outcome.job_id, error = %e, "failed to persist job status");
            }
        }
    }

    /// Best-effort event append.
    fn emit(&self, job_id: &str, stage: &str, level: EventLevel, message: &str) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append_event(job_id, stage, level, message) {
                warn!(job_id, error = %e, "failed to append job event");
            }
        }
    }
}

/// Derive the job status from the outcome.
///
/// `Failed` only when the estimate stage produced no usable data;
/// `FailedPartial` when usable estimate data exists but a fatal-category
/// error occurred; `Completed` otherwise. Warnings never block completion.
fn derive_status(outcome: &JobOutcome) -> JobStatus {
    if !outcome.has_estimate_data() {
        JobStatus::Failed
    } else if outcome.fatal_error_count() > 0 {
        JobStatus::FailedPartial
    } else {
        JobStatus::Completed
    }
}
