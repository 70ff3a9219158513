//! Immutable outcome records for completed (or failed) tasks.
//!
//! A `TaskResult` is appended to its agent's history and never mutated or
//! removed afterwards. Statistics are always recomputed from the full
//! history, never accumulated incrementally.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;
use crate::agent::AgentId;

/// The immutable outcome record for one task.
///
/// # Invariants
/// - If `success == false`, `error_message` describes the failure.
/// - Once created, a result is never modified; builders consume `self`
///   before the result enters a history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: TaskId,

    /// The agent that produced it.
    pub agent_id: AgentId,

    /// Opaque output payload from the worker.
    pub output: serde_json::Value,

    /// Whether the task completed successfully.
    pub success: bool,

    /// Human-readable failure description, if any.
    pub error_message: Option<String>,

    /// Wall-clock time the worker spent on the task.
    pub processing_time: Duration,

    /// Optional quality score reported by the worker, in `[0.0, 1.0]`.
    pub quality_score: Option<f64>,

    /// When this result was recorded.
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task_id: TaskId, agent_id: AgentId, output: serde_json::Value) -> Self {
        Self {
            task_id,
            agent_id,
            output,
            success: true,
            error_message: None,
            processing_time: Duration::ZERO,
            quality_score: None,
            created_at: Utc::now(),
        }
    }

    /// Create a failure result.
    pub fn failure(task_id: TaskId, agent_id: AgentId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            agent_id,
            output: serde_json::Value::Null,
            success: false,
            error_message: Some(error.into()),
            processing_time: Duration::ZERO,
            quality_score: None,
            created_at: Utc::now(),
        }
    }

    /// Record how long the worker took.
    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }

    /// Attach a quality score.
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }
}
