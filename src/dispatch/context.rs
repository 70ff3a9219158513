//! Per-call dispatch context: correlation label, optional deadline, and
//! cancellation.
//!
//! Every suspension point in the dispatch layer (rate-limit wait, slot
//! wait, the provider call itself, backoff sleeps) runs through this
//! context so a caller can bound the total operation time instead of
//! hanging on a saturated limiter.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::DispatchError;

/// Caller-supplied context for one logical provider call.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    label: String,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl DispatchContext {
    /// Create a context with no deadline and a fresh cancellation token.
    ///
    /// The label identifies the caller (typically the agent type) and is
    /// the prefix of generated request ids.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound the whole dispatch by an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Bound the whole dispatch by a duration from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Correlation id for one dispatch: caller label plus a timestamp.
    pub fn request_id(&self) -> String {
        format!("{}_{}", self.label, Utc::now().timestamp_millis())
    }

    /// Fail fast if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(DispatchError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run a future, aborting with `Cancelled`/`DeadlineExceeded` if the
    /// token fires or the deadline passes first.
    pub async fn run<T>(&self, fut: impl Future<Output = T>) -> Result<T, DispatchError> {
        tokio::pin!(fut);

        let deadline_passed = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(DispatchError::Cancelled),
            _ = deadline_passed => Err(DispatchError::DeadlineExceeded),
            out = &mut fut => Ok(out),
        }
    }

    /// Cancellable, deadline-aware sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), DispatchError> {
        self.run(tokio::time::sleep(duration)).await
    }
}
