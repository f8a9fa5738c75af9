//! Pipeline Stage Contract
//!
//! Every pipeline stage (extraction, discrepancy analysis, recommendation,
//! supervision) implements the same three-operation contract against a
//! declared configuration:
//!
//! - `plan` describes the sub-tasks the stage intends to run. It feeds
//!   observability only; the driver never schedules from it.
//! - `act` performs the real work and returns data plus a self-reported
//!   validation.
//! - `validate` independently re-scores the result.
//!
//! The free-function driver `execute_stage` owns the retry policy: an
//! explicit bounded loop with exponential backoff, per-attempt timeouts, and
//! the guarantee that a below-threshold result is returned rather than
//! dropped once the budget is exhausted.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::task::TaskContext;
use crate::validation::ValidationResult;

/// Base delay for exponential backoff between attempts.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Cap on the backoff delay.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Declared configuration for a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, used in logs and error messages
    pub name: String,
    /// Capability tags, for observability
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Retry budget (attempts = max_retries + 1)
    pub max_retries: u32,
    /// Minimum validation confidence for early acceptance
    pub confidence_threshold: f64,
}

impl StageConfig {
    /// Create a config with default budget (2 retries, 120s timeout, 0.7 threshold).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            timeout_ms: 120_000,
            max_retries: 2,
            confidence_threshold: 0.7,
        }
    }

    /// Add capability tags.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the acceptance threshold.
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One planned sub-task, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedSubtask {
    /// What the sub-task will do
    pub description: String,
    /// Estimated duration in milliseconds
    pub estimated_ms: u64,
    /// Estimated confidence of success
    pub estimated_confidence: f64,
}

/// A stage's declared plan. Logged, never used for scheduling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagePlan {
    /// Planned sub-tasks in intended order
    pub subtasks: Vec<PlannedSubtask>,
}

impl StagePlan {
    /// Plan with a single sub-task.
    pub fn single(description: impl Into<String>, estimated_ms: u64, confidence: f64) -> Self {
        Self {
            subtasks: vec![PlannedSubtask {
                description: description.into(),
                estimated_ms,
                estimated_confidence: confidence,
            }],
        }
    }

    /// Append a sub-task.
    pub fn with_subtask(
        mut self,
        description: impl Into<String>,
        estimated_ms: u64,
        confidence: f64,
    ) -> Self {
        self.subtasks.push(PlannedSubtask {
            description: description.into(),
            estimated_ms,
            estimated_confidence: confidence,
        });
        self
    }
}

/// Result of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult<T> {
    /// The produced data
    pub data: T,
    /// Validation attached to the result (independent score after the driver runs)
    pub validation: ValidationResult,
    /// Wall-clock time of the accepted attempt in milliseconds
    pub processing_time_ms: u64,
    /// Model used for the work, when an external model was involved
    pub model_used: Option<String>,
    /// Number of attempts the driver made (set by the driver)
    #[serde(default)]
    pub attempts: u32,
}

impl<T> StageResult<T> {
    /// Create a result with a self-reported validation.
    pub fn new(data: T, validation: ValidationResult, processing_time_ms: u64) -> Self {
        Self {
            data,
            validation,
            processing_time_ms,
            model_used: None,
            attempts: 0,
        }
    }

    /// Record the model that produced the data.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }
}

/// The plan/act/validate contract every pipeline stage implements.
///
/// Stages hold their collaborators (providers, extractors, prompt store) as
/// injected dependencies; there is no shared registry. The driver treats all
/// stages identically regardless of what kind of work they perform.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    type Input: Send + Sync;
    type Output: Send + Sync;

    /// The stage's declared configuration.
    fn config(&self) -> &StageConfig;

    /// Describe intended sub-tasks. Observability only.
    async fn plan(&self, input: &Self::Input, ctx: &TaskContext) -> CoreResult<StagePlan>;

    /// Perform the real work.
    async fn act(&self, input: &Self::Input, ctx: &TaskContext)
        -> CoreResult<StageResult<Self::Output>>;

    /// Independently score a result's correctness.
    async fn validate(
        &self,
        result: &StageResult<Self::Output>,
        ctx: &TaskContext,
    ) -> CoreResult<ValidationResult>;
}

/// Backoff delay before retrying after the given number of completed attempts.
///
/// `min(RETRY_BASE_DELAY_MS * 2^failed_attempts, RETRY_MAX_DELAY_MS)`.
pub fn backoff_delay(failed_attempts: u32) -> Duration {
    let exp = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << failed_attempts.min(16));
    Duration::from_millis(exp.min(RETRY_MAX_DELAY_MS))
}

/// Drive a stage through plan/act/validate with bounded retry.
///
/// Policy:
/// 1. `plan` runs once up front; a planning failure is logged, never fatal.
/// 2. Each attempt runs `act` under the stage's timeout, then `validate`.
/// 3. A valid result at or above the confidence threshold returns immediately.
/// 4. Below-threshold results are retried; once the budget is exhausted the
///    last result is returned anyway so no data is silently dropped. Callers
///    must inspect `validation` to decide downstream handling.
/// 5. `act` errors and timeouts consume an attempt; exhausting the budget
///    without any result raises `CoreError::StageExhausted` naming the
///    attempt count and last error.
pub async fn execute_stage<S: PipelineStage>(
    stage: &S,
    input: &S::Input,
    ctx: &TaskContext,
) -> CoreResult<StageResult<S::Output>> {
    let config = stage.config();
    let max_attempts = config.max_retries + 1;

    match stage.plan(input, ctx).await {
        Ok(plan) => debug!(
            stage = %config.name,
            job_id = %ctx.job_id,
            subtasks = plan.subtasks.len(),
            "stage planned"
        ),
        Err(e) => warn!(stage = %config.name, error = %e, "stage planning failed, continuing"),
    }

    let mut attempt_ctx = ctx.clone();
    let mut last_result: Option<StageResult<S::Output>> = None;
    let mut last_error: Option<CoreError> = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = backoff_delay(attempt - 1);
            debug!(
                stage = %config.name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt_ctx = attempt_ctx.next_attempt();
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(config.timeout(), stage.act(input, &attempt_ctx)).await;

        let mut result = match outcome {
            Err(_) => {
                warn!(
                    stage = %config.name,
                    attempt = attempt + 1,
                    timeout_ms = config.timeout_ms,
                    "stage attempt timed out"
                );
                last_error = Some(CoreError::Timeout {
                    stage: config.name.clone(),
                    timeout_ms: config.timeout_ms,
                });
                continue;
            }
            Ok(Err(e)) => {
                warn!(
                    stage = %config.name,
                    attempt = attempt + 1,
                    error = %e,
                    "stage attempt failed"
                );
                last_error = Some(e);
                continue;
            }
            Ok(Ok(result)) => result,
        };

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        result.attempts = attempt + 1;

        let validation = match stage.validate(&result, &attempt_ctx).await {
            Ok(v) => v,
            Err(e) => {
                warn!(stage = %config.name, error = %e, "validation errored, scoring result invalid");
                ValidationResult::invalid(format!("validation errored: {e}"))
            }
        };
        result.validation = validation;

        if result.validation.passes(config.confidence_threshold) {
            debug!(
                stage = %config.name,
                attempts = result.attempts,
                confidence = result.validation.confidence,
                "stage accepted"
            );
            return Ok(result);
        }

        debug!(
            stage = %config.name,
            attempt = attempt + 1,
            is_valid = result.validation.is_valid,
            confidence = result.validation.confidence,
            threshold = config.confidence_threshold,
            "stage result below threshold"
        );
        last_result = Some(result);
    }

    match last_result {
        Some(result) => {
            warn!(
                stage = %config.name,
                attempts = result.attempts,
                confidence = result.validation.confidence,
                "retry budget exhausted, returning last result"
            );
            Ok(result)
        }
        None => Err(CoreError::StageExhausted {
            stage: config.name.clone(),
            attempts: max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}
