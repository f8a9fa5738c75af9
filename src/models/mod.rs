//! Domain Models
//!
//! Serde-serializable data structures shared across the pipeline services.

pub mod discrepancy;
pub mod estimate;
pub mod job;
pub mod recommendation;
pub mod roof;

pub use discrepancy::{
    ComparisonPoint, ComparisonStatus, DiscrepancyReport, CONSISTENCY_SCORE_MAX,
    CONSISTENCY_SCORE_MIN,
};
pub use estimate::{EstimateRecord, LineItem};
pub use job::{
    ErrorCategory, EventLevel, JobError, JobEvent, JobOutcome, JobRecord, SkippedStage,
};
pub use recommendation::{
    RecommendationCategory, RecommendationPriority, SupplementRecommendation,
};
pub use roof::{RoofMeasurementRecord, SQFT_PER_SQUARE};
