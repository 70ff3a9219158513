//! Core types for the agent system.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::RouterError;
use crate::task::{TaskId, TaskResult};

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Create a new unique agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of an agent.
///
/// # State Machine
/// ```text
/// Idle -> Working   (task dequeued)
/// Working -> Idle   (task finished, success or failure)
/// Working -> Paused (pause requested; applied when the task finishes)
/// Paused -> Idle    (resume)
/// Working -> Error  (worker panicked; treated like Idle for new work)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Working,
    Paused,
    Error,
}

impl AgentState {
    /// Whether the agent may pick up a new task in this state.
    ///
    /// `Error` does not block future work: a worker failure is recorded in
    /// the result history, never as a terminal agent state.
    pub fn can_start_work(&self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Working => write!(f, "working"),
            Self::Paused => write!(f, "paused"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Rolling statistics, always recomputed from the full result history.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentStats {
    /// Total results recorded (successes and failures).
    pub total_completed: u64,
    /// Successes over total; `1.0` with an empty history.
    pub success_rate: f64,
    /// Mean of all reported quality scores, if any were reported.
    pub average_quality: Option<f64>,
    /// Mean processing time over the whole history.
    pub average_processing_time: Option<Duration>,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            total_completed: 0,
            success_rate: 1.0,
            average_quality: None,
            average_processing_time: None,
        }
    }
}

impl AgentStats {
    /// Recompute statistics from a result history.
    ///
    /// Pure function of the history: recomputing from the same frozen
    /// slice always yields identical values, so the numbers can never
    /// drift the way incrementally accumulated counters can.
    pub fn from_history(history: &[TaskResult]) -> Self {
        if history.is_empty() {
            return Self::default();
        }

        let total = history.len() as u64;
        let successes = history.iter().filter(|r| r.success).count() as u64;

        let quality_scores: Vec<f64> = history.iter().filter_map(|r| r.quality_score).collect();
        let average_quality = if quality_scores.is_empty() {
            None
        } else {
            Some(quality_scores.iter().sum::<f64>() / quality_scores.len() as f64)
        };

        let total_time: Duration = history.iter().map(|r| r.processing_time).sum();
        let average_processing_time = Some(total_time / history.len() as u32);

        Self {
            total_completed: total,
            success_rate: successes as f64 / total as f64,
            average_quality,
            average_processing_time,
        }
    }
}

/// Read-only snapshot of one agent, safe to poll while it works.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub state: AgentState,
    pub current_task: Option<TaskId>,
    pub queue_len: usize,
    pub capabilities: Vec<String>,
    pub stats: AgentStats,
}

/// Errors a worker can surface from its extension point.
///
/// Whatever the variant, the owning agent converts it into a failed
/// `TaskResult`; worker errors never escape the processing loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("task execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Provider(#[from] RouterError),
}

/// Output of a successful worker invocation.
#[derive(Debug, Clone)]
pub struct WorkOutput {
    /// Opaque result payload.
    pub output: serde_json::Value,
    /// Optional self-reported quality score in `[0.0, 1.0]`.
    pub quality_score: Option<f64>,
}

impl WorkOutput {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            quality_score: None,
        }
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }
}

impl From<serde_json::Value> for WorkOutput {
    fn from(output: serde_json::Value) -> Self {
        Self::new(output)
    }
}

/// Successful task ids, used for dependency admission checks.
pub(crate) type CompletedSet = HashSet<TaskId>;
