//! Job Models
//!
//! Job-level outcome types: categorized errors, skipped-stage records, the
//! orchestrator's assembled outcome, and the persisted job row/event shapes.

use claimlens_core::{JobStatus, StageResult};
use serde::{Deserialize, Serialize};

use super::discrepancy::DiscrepancyReport;
use super::estimate::EstimateRecord;
use super::recommendation::SupplementRecommendation;
use super::roof::RoofMeasurementRecord;

/// Error taxonomy for pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Document unreadable or a collaborator threw
    Extraction,
    /// Collaborator response not in the expected structured form
    Parse,
    /// Result structurally valid but below confidence/completeness threshold
    Validation,
    /// A prerequisite stage produced no data; dependent stage skipped
    Orchestration,
    /// Uncaught failure anywhere in the orchestrator
    Critical,
}

/// One recorded job-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Error category
    pub category: ErrorCategory,
    /// Stage that produced the error
    pub stage: String,
    /// Human-readable message
    pub message: String,
    /// Whether the error counts toward a FailedPartial status
    pub fatal: bool,
}

impl JobError {
    /// An extraction failure (fatal for status derivation).
    pub fn extraction(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Extraction,
            stage: stage.into(),
            message: message.into(),
            fatal: true,
        }
    }

    /// A parse failure that degraded to a fallback (non-fatal).
    pub fn parse(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Parse,
            stage: stage.into(),
            message: message.into(),
            fatal: false,
        }
    }

    /// A validation shortfall (non-fatal; the data is still usable).
    pub fn validation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Validation,
            stage: stage.into(),
            message: message.into(),
            fatal: false,
        }
    }

    /// A skipped dependent stage (fatal for status derivation).
    pub fn orchestration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Orchestration,
            stage: stage.into(),
            message: message.into(),
            fatal: true,
        }
    }

    /// An uncaught failure (fatal).
    pub fn critical(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Critical,
            stage: stage.into(),
            message: message.into(),
            fatal: true,
        }
    }
}

/// A dependent stage that was skipped, with its recorded reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedStage {
    /// Stage name
    pub stage: String,
    /// Why the stage did not run
    pub reason: String,
}

/// The orchestrator's assembled outcome for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Job identifier
    pub job_id: String,
    /// Derived job status
    pub status: JobStatus,
    /// Estimate extraction result, when the stage produced one
    pub estimate: Option<StageResult<EstimateRecord>>,
    /// Roof extraction result, when a roof document was supplied and extracted
    pub roof: Option<StageResult<RoofMeasurementRecord>>,
    /// Discrepancy analysis, when it ran
    pub discrepancy: Option<DiscrepancyReport>,
    /// Supplement recommendations, when the engine ran
    pub recommendations: Vec<SupplementRecommendation>,
    /// Accumulated job-level errors (non-fatal and fatal)
    pub errors: Vec<JobError>,
    /// Accumulated job-level warnings
    pub warnings: Vec<String>,
    /// Stages skipped with explicit reasons
    pub skipped: Vec<SkippedStage>,
    /// When the job started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// When the job finished
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobOutcome {
    /// Create an in-progress outcome shell.
    pub fn started(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::InProgress,
            estimate: None,
            roof: None,
            discrepancy: None,
            recommendations: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            skipped: Vec::new(),
            started_at: chrono::Utc::now(),
            finished_at: None,
        }
    }

    /// Count of fatal-category errors.
    pub fn fatal_error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.fatal).count()
    }

    /// Whether usable estimate data exists.
    pub fn has_estimate_data(&self) -> bool {
        self.estimate
            .as_ref()
            .map(|r| r.data.has_usable_data())
            .unwrap_or(false)
    }
}

/// Persisted job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier
    pub id: String,
    /// Current status
    pub status: JobStatus,
    /// Number of recorded errors
    pub error_count: usize,
    /// Number of recorded warnings
    pub warning_count: usize,
    /// Creation timestamp
    pub created_at: Option<String>,
    /// Last update timestamp
    pub updated_at: Option<String>,
}

/// Severity of a job event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warning => write!(f, "warning"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventLevel::Info),
            "warning" => Ok(EventLevel::Warning),
            "error" => Ok(EventLevel::Error),
            other => Err(format!("unknown event level: {other}")),
        }
    }
}

/// One append-only job event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Sequence number within the job (assigned by storage)
    pub seq: i64,
    /// Job identifier
    pub job_id: String,
    /// Stage that emitted the event
    pub stage: String,
    /// Event severity
    pub level: EventLevel,
    /// Event message
    pub message: String,
    /// When the event was recorded
    pub created_at: Option<String>,
}
