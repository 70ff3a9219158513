//! # taskforce
//!
//! Coordination core for pools of autonomous AI worker agents.
//!
//! Each agent owns a private queue of prioritized, dependency-gated tasks
//! and runs at most one task at a time; all provider traffic funnels
//! through a shared dispatch stack that enforces a sliding-window rate
//! limit, bounds in-flight concurrency, retries with exponential backoff,
//! and fails over between interchangeable providers.
//!
//! ```text
//!   caller ──▶ Agent ──▶ TaskQueue (priority + dependencies)
//!                │
//!                ▼  one task at a time
//!             Worker (domain extension point)
//!                │
//!                ▼
//!          ProviderRouter ──▶ RetryingDispatcher ──▶ Provider
//!            (failover)        (rate limit, slots,
//!                               retry + backoff)
//! ```
//!
//! Task payloads and provider content are opaque here: the core moves,
//! queues, retries, and measures them, and never interprets them.
//!
//! ## Modules
//! - `task`: tasks, per-agent queues, immutable results
//! - `agent`: the agent state machine, the `Worker` trait, the pool
//! - `dispatch`: rate limiter, concurrency slots, retrying dispatcher
//! - `provider`: the `Provider` trait, bundled clients, failover router
//! - `config` / `coordinator`: env-driven configuration and the
//!   dependency-injected composition root

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod provider;
pub mod task;

pub use agent::{Agent, AgentId, AgentPool, AgentState, AgentStatus, WorkOutput, Worker, WorkerError};
pub use config::{Config, ConfigError};
pub use coordinator::{Coordinator, CoordinatorError};
pub use dispatch::{
    ConcurrencySlots, DispatchContext, DispatchError, RateLimitConfig, RateLimiter, RetryPolicy,
    RetryingDispatcher,
};
pub use provider::{
    AnthropicProvider, Message, OpenAiProvider, Provider, ProviderKind, ProviderRequest,
    ProviderResponse, ProviderRouter, Role, RouterError, Usage,
};
pub use task::{SubmitError, Task, TaskId, TaskPriority, TaskQueue, TaskResult};
