//! Review Models
//!
//! Data structures for the supervisor's second-pass review: the input view it
//! checks, per-check results, severity-tagged issues, and the terminal report.

use claimlens_core::JobStatus;
use serde::{Deserialize, Serialize};

/// Severity of a review issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be addressed; downgrades the final status
    Critical,
    /// Worth surfacing; never blocks completion
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

/// One issue surfaced by a review check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIssue {
    /// How serious the issue is
    pub severity: Severity,
    /// What is wrong
    pub message: String,
    /// What the caller could do about it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ReviewIssue {
    /// Create a critical issue.
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a warning issue.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Status of one review check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

impl CheckStatus {
    /// Whether this status counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, CheckStatus::Passed | CheckStatus::Skipped)
    }
}

/// Result of running one review check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check identifier
    pub check_id: String,
    /// Check display name
    pub check_name: String,
    /// Outcome
    pub status: CheckStatus,
    /// Issues the check surfaced
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
}

impl CheckResult {
    /// A passed check with no issues.
    pub fn passed(check_id: &str, check_name: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            check_name: check_name.to_string(),
            status: CheckStatus::Passed,
            issues: Vec::new(),
        }
    }

    /// A failed check carrying issues.
    pub fn failed(check_id: &str, check_name: &str, issues: Vec<ReviewIssue>) -> Self {
        Self {
            check_id: check_id.to_string(),
            check_name: check_name.to_string(),
            status: CheckStatus::Failed,
            issues,
        }
    }

    /// A skipped check (inputs unavailable).
    pub fn skipped(check_id: &str, check_name: &str, reason: impl Into<String>) -> Self {
        Self {
            check_id: check_id.to_string(),
            check_name: check_name.to_string(),
            status: CheckStatus::Skipped,
            issues: vec![ReviewIssue::warning(reason)],
        }
    }

    /// Whether the check surfaced a critical issue.
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

/// Summary of one field for review purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Field name, e.g. "claim_number"
    pub name: String,
    /// Whether a value was extracted
    pub present: bool,
    /// Extraction confidence
    pub confidence: f64,
    /// Whether the field must be present for a usable job
    pub mandatory: bool,
    /// Minimum acceptable confidence when present
    pub confidence_floor: f64,
}

impl FieldSummary {
    /// Create a summary for an optional field with the default floor.
    pub fn new(name: impl Into<String>, present: bool, confidence: f64) -> Self {
        Self {
            name: name.into(),
            present,
            confidence,
            mandatory: false,
            confidence_floor: 0.3,
        }
    }

    /// Mark the field mandatory.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Set the confidence floor.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor;
        self
    }
}

/// A numeric pair the supervisor sanity-checks across records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericCrossCheck {
    /// What is being compared, e.g. "roof area"
    pub name: String,
    /// Label for the left value, e.g. "estimate line items"
    pub left_label: String,
    /// Left value, if available
    pub left: Option<f64>,
    /// Label for the right value, e.g. "roof report"
    pub right_label: String,
    /// Right value, if available
    pub right: Option<f64>,
    /// Relative difference above which a warning is raised
    pub warn_ratio: f64,
}

/// The supervisor's view of a finished job.
///
/// Deliberately domain-light: the application maps its records into field
/// summaries and cross-checks so this crate stays free of pipeline types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    /// Job identifier
    pub job_id: String,
    /// Status the orchestrator derived
    pub orchestrator_status: JobStatus,
    /// Count of fatal-category errors the orchestrator recorded
    pub fatal_error_count: usize,
    /// Count of all recorded errors
    pub error_count: usize,
    /// Count of recorded warnings
    pub warning_count: usize,
    /// Per-stage validation confidences
    pub stage_confidences: Vec<(String, f64)>,
    /// Field summaries from the fused records
    pub fields: Vec<FieldSummary>,
    /// Numeric sanity pairs
    pub cross_checks: Vec<NumericCrossCheck>,
    /// Discrepancy consistency score, when the engine ran
    pub consistency_score: Option<f64>,
    /// Number of supplement recommendations produced
    pub recommendation_count: usize,
}

/// Terminal report produced by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    /// Job identifier
    pub job_id: String,
    /// Final status after review
    pub final_status: JobStatus,
    /// Blend of check outcomes and upstream stage confidences
    pub overall_confidence: f64,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Positive findings worth surfacing
    pub highlights: Vec<String>,
    /// Issues to address, critical first
    pub issues: Vec<ReviewIssue>,
    /// Actionable suggestions
    pub suggestions: Vec<String>,
    /// When the review ran
    pub reviewed_at: chrono::DateTime<chrono::Utc>,
}

impl ReviewReport {
    /// All critical issues in the report.
    pub fn critical_issues(&self) -> impl Iterator<Item = &ReviewIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
    }
}
