//! Core task type: an opaque unit of requested work with priority and
//! dependencies.
//!
//! # Invariants
//! - A `Task` is immutable after creation; only its queue position changes.
//! - `dependencies` refer to tasks whose *successful* results must exist
//!   before this task is admitted to a queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority of a task within an agent's queue.
///
/// Ordering is `Critical > High > Medium > Low`; the derived `Ord` follows
/// declaration order, so `Critical` compares greatest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Multiplier applied to an agent's historical mean processing time
    /// when estimating how long a task of this priority will take.
    pub fn duration_multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.3,
            Self::Critical => 1.5,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A unit of requested work.
///
/// The payload is opaque to the coordination core: it is carried to the
/// worker unchanged and never interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    task_type: String,
    payload: serde_json::Value,
    priority: TaskPriority,
    dependencies: Vec<TaskId>,
    created_at: DateTime<Utc>,
    estimated_duration: Option<Duration>,
}

impl Task {
    /// Create a new task with default (`Medium`) priority and no
    /// dependencies.
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            payload,
            priority: TaskPriority::default(),
            dependencies: Vec::new(),
            created_at: Utc::now(),
            estimated_duration: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Declare the task ids whose successful results must exist before this
    /// task is admitted.
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Attach a caller-side duration estimate.
    pub fn with_estimated_duration(mut self, estimate: Duration) -> Self {
        self.estimated_duration = Some(estimate);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn estimated_duration(&self) -> Option<Duration> {
        self.estimated_duration
    }
}
