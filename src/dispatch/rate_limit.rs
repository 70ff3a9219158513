//! Sliding-window rate limiter for provider calls.
//!
//! Admission control over a rolling window: at most `max_requests` calls
//! are admitted per `window`. `acquire` is a blocking gate - callers
//! suspend until the window has room, so the limiter imposes a strict
//! global ceiling on call rate regardless of how many agents are running.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{DispatchContext, DispatchError};

/// Sliding-window limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum calls admitted per rolling window.
    pub max_requests: usize,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Shared admission gate; one instance serves every agent in the process.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(mut config: RateLimitConfig) -> Self {
        // A zero-capacity window would never admit anyone.
        config.max_requests = config.max_requests.max(1);
        Self {
            config,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until the window has room, then record this call's timestamp.
    ///
    /// Blocked callers are admitted in arrival order (the internal mutex is
    /// FIFO); a caller that re-enters after sleeping joins the back of the
    /// queue. Aborts with `Cancelled`/`DeadlineExceeded` from the context
    /// rather than waiting past the caller's bound.
    pub async fn acquire(&self, ctx: &DispatchContext) -> Result<(), DispatchError> {
        loop {
            ctx.check()?;

            let wait = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while stamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.config.window)
                {
                    stamps.pop_front();
                }

                if stamps.len() < self.config.max_requests {
                    stamps.push_back(now);
                    debug!(used = stamps.len(), max = self.config.max_requests, "rate limit permit granted");
                    return Ok(());
                }

                // Wait until the oldest recorded call exits the window.
                self.config.window.saturating_sub(now.duration_since(stamps[0]))
            };

            warn!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            ctx.sleep(wait).await?;
        }
    }

    /// How many calls are currently recorded inside the window.
    pub async fn window_usage(&self) -> usize {
        let mut stamps = self.timestamps.lock().await;
        let now = Instant::now();
        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            stamps.pop_front();
        }
        stamps.len()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
