//! ClaimLens Core
//!
//! Foundational types for the ClaimLens pipeline: the extracted-field model,
//! the plan/act/validate stage contract with its retry driver, and the shared
//! task/validation/status types. This crate has zero dependencies on
//! application-level code (storage, LLM providers, document collaborators).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `field` - `ExtractedField<T>` value/confidence/provenance wrapper
//! - `task` - `TaskContext` identity and retry/timeout budget
//! - `validation` - `ValidationResult` accept/retry signal
//! - `stage` - `PipelineStage` contract and the `execute_stage` retry driver
//! - `status` - Job lifecycle states
//!
//! ## Design Principles
//!
//! 1. **Trait + injected config, not inheritance** - stages implement
//!    `PipelineStage` against a `StageConfig` value; the retry driver is a
//!    free function over the trait.
//! 2. **Explicit bounded retry loop** - attempt counts are plain counters,
//!    independently testable, never recursion.
//! 3. **Unidirectional dependency** - this crate depends on nothing else in
//!    the workspace.

pub mod error;
pub mod field;
pub mod stage;
pub mod status;
pub mod task;
pub mod validation;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Field Model ────────────────────────────────────────────────────────
pub use field::{
    clamp_confidence, mean_confidence, ExtractedField, FieldSource, NULL_VALUE_MAX_CONFIDENCE,
};

// ── Stage Contract ─────────────────────────────────────────────────────
pub use stage::{
    backoff_delay, execute_stage, PipelineStage, PlannedSubtask, StageConfig, StagePlan,
    StageResult, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_MS,
};

// ── Task & Validation ──────────────────────────────────────────────────
pub use task::{TaskContext, TaskPriority};
pub use validation::ValidationResult;

// ── Job Status ─────────────────────────────────────────────────────────
pub use status::JobStatus;
