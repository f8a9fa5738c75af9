//! Job Lifecycle Status
//!
//! Shared across the orchestrator, supervisor, and storage layers.
//!
//! `Failed` is reserved for jobs where the primary (estimate) extraction
//! produced no usable data at all; `FailedPartial` marks jobs where later
//! stages degraded but primary data exists; warnings never block `Completed`.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet started
    Pending,
    /// Pipeline is running
    InProgress,
    /// Finished with usable output (possibly with warnings)
    Completed,
    /// Primary data exists but at least one fatal-category error occurred
    FailedPartial,
    /// Primary extraction produced no usable data
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::FailedPartial | JobStatus::Failed
        )
    }

    /// Whether the job carries a failure of any category.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::FailedPartial | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::FailedPartial => write!(f, "failed_partial"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed_partial" => Ok(JobStatus::FailedPartial),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::FailedPartial.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_failure_states() {
        assert!(!JobStatus::Completed.is_failure());
        assert!(JobStatus::FailedPartial.is_failure());
        assert!(JobStatus::Failed.is_failure());
    }

    #[test]
    fn test_round_trip_display_parse() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::FailedPartial,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }
}
