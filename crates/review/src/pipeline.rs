//! Review Pipeline
//!
//! Runs the check table over a `ReviewInput` and assembles the terminal
//! report: final status, blended confidence, highlights, issues, and
//! suggestions. A CRITICAL issue or an orchestrator-reported fatal failure
//! downgrades the final status; warning-level issues never block completion.

use claimlens_core::{clamp_confidence, JobStatus};
use tracing::{debug, info};

use crate::checks::{builtin_checks, ReviewCheck};
use crate::models::{CheckResult, ReviewInput, ReviewIssue, ReviewReport, Severity};

/// Weight of upstream stage confidences in the blended overall confidence.
const UPSTREAM_CONFIDENCE_WEIGHT: f64 = 0.6;

/// Weight of the check pass ratio in the blended overall confidence.
const CHECK_SCORE_WEIGHT: f64 = 0.4;

/// The supervisor's check pipeline.
pub struct ReviewPipeline {
    checks: Vec<ReviewCheck>,
}

impl ReviewPipeline {
    /// Pipeline with the built-in check table.
    pub fn new() -> Self {
        Self {
            checks: builtin_checks(),
        }
    }

    /// Pipeline with a custom check table.
    pub fn with_checks(checks: Vec<ReviewCheck>) -> Self {
        Self { checks }
    }

    /// Run all checks and assemble the terminal report.
    pub fn review(&self, input: &ReviewInput) -> ReviewReport {
        let mut results: Vec<CheckResult> = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let result = (check.run)(input);
            debug!(check = check.id, status = ?result.status, "review check finished");
            results.push(result);
        }

        let mut issues: Vec<ReviewIssue> = results.iter().flat_map(|r| r.issues.clone()).collect();
        // Critical first so callers can read the report top-down.
        issues.sort_by_key(|i| match i.severity {
            Severity::Critical => 0,
            Severity::Warning => 1,
        });

        let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
        let final_status = derive_final_status(input, has_critical);
        let overall_confidence = blend_confidence(input, &results);

        let highlights = collect_highlights(input, &results);
        let suggestions: Vec<String> = issues
            .iter()
            .filter_map(|i| i.suggestion.clone())
            .collect();

        info!(
            job_id = %input.job_id,
            status = %final_status,
            confidence = overall_confidence,
            issues = issues.len(),
            "supervisor review complete"
        );

        ReviewReport {
            job_id: input.job_id.clone(),
            final_status,
            overall_confidence,
            checks: results,
            highlights,
            issues,
            suggestions,
            reviewed_at: chrono::Utc::now(),
        }
    }
}

impl Default for ReviewPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the final status from the orchestrator's status and review findings.
///
/// The supervisor can only downgrade, never upgrade: a `Failed` job stays
/// failed, and a `Completed` job with a critical finding becomes
/// `FailedPartial` (usable primary data exists, or the orchestrator would
/// already have failed it).
fn derive_final_status(input: &ReviewInput, has_critical: bool) -> JobStatus {
    match input.orchestrator_status {
        JobStatus::Failed => JobStatus::Failed,
        JobStatus::FailedPartial => JobStatus::FailedPartial,
        JobStatus::Completed => {
            if has_critical || input.fatal_error_count > 0 {
                JobStatus::FailedPartial
            } else {
                JobStatus::Completed
            }
        }
        // Non-terminal statuses reaching review means the orchestrator was
        // interrupted; treat as partial.
        JobStatus::Pending | JobStatus::InProgress => JobStatus::FailedPartial,
    }
}

/// Blend upstream stage confidences with the check pass ratio.
fn blend_confidence(input: &ReviewInput, results: &[CheckResult]) -> f64 {
    let upstream = if input.stage_confidences.is_empty() {
        0.0
    } else {
        input.stage_confidences.iter().map(|(_, c)| c).sum::<f64>()
            / input.stage_confidences.len() as f64
    };

    let check_score = if results.is_empty() {
        1.0
    } else {
        results.iter().filter(|r| r.status.is_success()).count() as f64 / results.len() as f64
    };

    clamp_confidence(UPSTREAM_CONFIDENCE_WEIGHT * upstream + CHECK_SCORE_WEIGHT * check_score)
}

fn collect_highlights(input: &ReviewInput, results: &[CheckResult]) -> Vec<String> {
    let mut highlights = Vec::new();

    if results
        .iter()
        .find(|r| r.check_id == "mandatory-fields")
        .map(|r| r.status.is_success())
        .unwrap_or(false)
    {
        highlights.push("All mandatory fields were extracted".to_string());
    }

    if let Some(score) = input.consistency_score {
        highlights.push(format!("Cross-document consistency score: {score:.2}"));
    }

    if input.recommendation_count > 0 {
        highlights.push(format!(
            "{} supplement recommendation(s) generated",
            input.recommendation_count
        ));
    }

    highlights
}

#[cfg(test)]
mod tests {
    use claimlens_core::JobStatus;

    use super::*;
    use crate::models::FieldSummary;

    fn completed_input() -> ReviewInput {
        ReviewInput {
            job_id: "job-1".to_string(),
            orchestrator_status: JobStatus::Completed,
            fatal_error_count: 0,
            error_count: 0,
            warning_count: 1,
            stage_confidences: vec![
                ("estimate_extraction".to_string(), 0.9),
                ("discrepancy_analysis".to_string(), 0.8),
            ],
            fields: vec![
                FieldSummary::new("claim_number", true, 0.9).mandatory(),
                FieldSummary::new("total_rcv", true, 0.85).mandatory(),
            ],
            cross_checks: Vec::new(),
            consistency_score: Some(0.82),
            recommendation_count: 2,
        }
    }

    #[test]
    fn test_clean_job_stays_completed() {
        let report = ReviewPipeline::new().review(&completed_input());
        assert_eq!(report.final_status, JobStatus::Completed);
        assert!(report.critical_issues().count() == 0);
        assert!(report.overall_confidence > 0.7);
        assert!(!report.highlights.is_empty());
    }

    #[test]
    fn test_missing_mandatory_field_downgrades() {
        let mut input = completed_input();
        input.fields.push(FieldSummary::new("property_address", false, 0.0).mandatory());
        let report = ReviewPipeline::new().review(&input);
        assert_eq!(report.final_status, JobStatus::FailedPartial);
        assert!(report.critical_issues().count() >= 1);
    }

    #[test]
    fn test_fatal_error_downgrades_completed() {
        let mut input = completed_input();
        input.fatal_error_count = 1;
        input.error_count = 1;
        let report = ReviewPipeline::new().review(&input);
        assert_eq!(report.final_status, JobStatus::FailedPartial);
    }

    #[test]
    fn test_failed_job_stays_failed() {
        let mut input = completed_input();
        input.orchestrator_status = JobStatus::Failed;
        input.error_count = 1;
        let report = ReviewPipeline::new().review(&input);
        assert_eq!(report.final_status, JobStatus::Failed);
    }

    #[test]
    fn test_warnings_never_block_completion() {
        let mut input = completed_input();
        // Present-but-low-confidence field produces only a warning.
        input.fields.push(FieldSummary::new("deductible", true, 0.1).with_floor(0.3));
        let report = ReviewPipeline::new().review(&input);
        assert_eq!(report.final_status, JobStatus::Completed);
        assert!(report.issues.iter().any(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn test_issues_sorted_critical_first() {
        let mut input = completed_input();
        input.fields.push(FieldSummary::new("deductible", true, 0.1).with_floor(0.3));
        input.fields.push(FieldSummary::new("claim_total", false, 0.0).mandatory());
        let report = ReviewPipeline::new().review(&input);
        assert_eq!(report.issues[0].severity, Severity::Critical);
    }
}
