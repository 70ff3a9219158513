//! Dispatch module - the shared machinery every provider call goes through.
//!
//! One logical call is: sliding-window rate-limit admission, then a bounded
//! concurrency slot, then the provider invocation with bounded retry and
//! exponential backoff. All waits are cooperative suspensions that honor
//! the caller's deadline and cancellation token.

mod context;
mod dispatcher;
mod rate_limit;
mod slots;

pub use context::DispatchContext;
pub use dispatcher::{DispatcherStats, RetryPolicy, RetryingDispatcher};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use slots::{ConcurrencySlots, SlotPermit, SlotStatus};

use crate::provider::ProviderError;

/// Errors surfaced by the dispatch layer.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Every retry attempt against one provider failed; the last provider
    /// error is carried unmodified.
    #[error("provider call failed after {attempts} attempts: {source}")]
    ProviderCallFailed {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The caller's cancellation token fired while waiting or calling.
    #[error("dispatch cancelled by caller")]
    Cancelled,

    /// The caller-supplied deadline passed while waiting or calling.
    #[error("dispatch deadline exceeded")]
    DeadlineExceeded,
}
