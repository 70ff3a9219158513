//! Agents module - queue-owning workers and their pool.
//!
//! An `Agent` owns one task queue and runs at most one task at a time;
//! the domain-specific work happens behind the `Worker` trait. The
//! `AgentPool` registers agents by identity and type and picks an
//! available agent for incoming work.
//!
//! # Design Principles
//! - The `Working` state is the mutex substitute: the processing loop is
//!   a no-op unless the agent can start work, so a single agent never
//!   runs two tasks concurrently while separate agents progress freely.
//! - Every task outcome - success, worker error, even a worker panic -
//!   becomes an immutable `TaskResult` in the history. Nothing escapes
//!   the loop.

mod agent;
mod pool;
mod types;

pub use agent::Agent;
pub use pool::{AgentPool, PoolStatus, StateCounts, TypeStatus};
pub use types::{AgentId, AgentState, AgentStats, AgentStatus, WorkOutput, WorkerError};

use async_trait::async_trait;

use crate::task::Task;

/// The work-execution extension point.
///
/// Implemented per domain; the coordination core never interprets the
/// task payload or the produced output. A worker declares the task types
/// it implements at registration time, and the pool routes by those
/// capabilities - no runtime type inspection.
///
/// # Invariants
/// - `process` is invoked for one task at a time per owning agent.
/// - Returning `Err` marks the task failed; it never tears down the agent.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Task types this worker implements.
    fn capabilities(&self) -> &[String];

    /// Execute one task and produce an opaque output payload.
    async fn process(&self, task: &Task) -> Result<WorkOutput, WorkerError>;
}
