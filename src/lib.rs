//! ClaimLens
//!
//! Reconciles an insurance damage estimate against a roof-measurement
//! report: two extraction agents (text path and vision path, fused per field
//! by confidence), a discrepancy engine, a rule-driven supplement
//! recommender, an orchestrator tolerant of partial failure, and a
//! supervisor quality gate.

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::{
    ComparisonPoint, ComparisonStatus, DiscrepancyReport, EstimateRecord, JobError, JobOutcome,
    LineItem, RoofMeasurementRecord, SupplementRecommendation,
};
pub use services::{
    DocumentInput, EstimateExtractionAgent, ExtractionStrategy, JobRequest, Orchestrator,
    RoofExtractionAgent, Supervisor,
};
pub use storage::Database;
pub use utils::error::{AppError, AppResult};
