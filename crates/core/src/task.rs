//! Task Context
//!
//! Per-task execution context threaded through every pipeline stage. Carries
//! identity (job/task/parent ids), scheduling hints, and the retry/timeout
//! budget. Immutable from a stage's point of view; the driver clones and
//! bumps the retry counter between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling priority for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Context for one task within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// The job this task belongs to
    pub job_id: String,
    /// Unique id of this task
    pub task_id: String,
    /// Parent task, when this task was spawned by another stage
    pub parent_task_id: Option<String>,
    /// Scheduling priority
    #[serde(default)]
    pub priority: TaskPriority,
    /// Maximum retries for this task
    pub max_retries: u32,
    /// Current retry count (0 on the first attempt)
    pub retry_count: u32,
    /// Per-attempt timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
}

impl TaskContext {
    /// Create a context for a top-level task.
    pub fn new(job_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            task_id: task_id.into(),
            parent_task_id: None,
            priority: TaskPriority::Normal,
            max_retries: 2,
            retry_count: 0,
            timeout: Duration::from_secs(120),
        }
    }

    /// Derive a child context for a sub-task.
    pub fn child(&self, task_id: impl Into<String>) -> Self {
        Self {
            job_id: self.job_id.clone(),
            task_id: task_id.into(),
            parent_task_id: Some(self.task_id.clone()),
            priority: self.priority,
            max_retries: self.max_retries,
            retry_count: 0,
            timeout: self.timeout,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A copy of this context with the retry counter incremented.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }

    /// Whether the retry budget still allows another attempt.
    pub fn retries_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Serialize `Duration` as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_defaults() {
        let ctx = TaskContext::new("job-1", "task-1");
        assert_eq!(ctx.job_id, "job-1");
        assert_eq!(ctx.task_id, "task-1");
        assert_eq!(ctx.parent_task_id, None);
        assert_eq!(ctx.priority, TaskPriority::Normal);
        assert_eq!(ctx.retry_count, 0);
        assert!(ctx.retries_remaining());
    }

    #[test]
    fn test_child_context_links_parent() {
        let parent = TaskContext::new("job-1", "task-1").with_priority(TaskPriority::High);
        let child = parent.child("task-2");
        assert_eq!(child.job_id, "job-1");
        assert_eq!(child.parent_task_id.as_deref(), Some("task-1"));
        assert_eq!(child.priority, TaskPriority::High);
        assert_eq!(child.retry_count, 0);
    }

    #[test]
    fn test_next_attempt_increments_counter() {
        let ctx = TaskContext::new("job-1", "task-1").with_max_retries(2);
        let second = ctx.next_attempt();
        let third = second.next_attempt();
        assert_eq!(second.retry_count, 1);
        assert_eq!(third.retry_count, 2);
        assert!(second.retries_remaining());
        assert!(!third.retries_remaining());
    }

    #[test]
    fn test_context_serialization() {
        let ctx = TaskContext::new("job-1", "task-1").with_timeout(Duration::from_secs(30));
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: TaskContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.timeout, Duration::from_secs(30));
    }
}
