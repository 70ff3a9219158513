//! Retrying dispatcher: executes one provider call under the shared
//! rate limit and concurrency bound, retrying transient failures with
//! exponential backoff.
//!
//! The retry budget applies to a single provider; failover across
//! providers is the router's job and gives each provider a fresh budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ConcurrencySlots, DispatchContext, DispatchError, RateLimiter};
use crate::provider::{Provider, ProviderError, ProviderRequest, ProviderResponse};

/// Bounded-retry settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per provider call (first try included).
    pub attempts: u32,
    /// Backoff base: the sleep after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given zero-based failed attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Cumulative counters snapshot.
///
/// `total_requests` counts every dispatched call, `error_count` the calls
/// whose final outcome was a failure; the success rate is derived from
/// those two.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DispatcherStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub error_count: u64,
    pub success_rate: f64,
}

/// Executes provider calls under shared admission control.
#[derive(Debug)]
pub struct RetryingDispatcher {
    rate_limiter: RateLimiter,
    slots: ConcurrencySlots,
    retry: RetryPolicy,
    total_requests: AtomicU64,
    total_tokens: AtomicU64,
    error_count: AtomicU64,
}

impl RetryingDispatcher {
    pub fn new(rate_limiter: RateLimiter, slots: ConcurrencySlots, mut retry: RetryPolicy) -> Self {
        retry.attempts = retry.attempts.max(1);
        Self {
            rate_limiter,
            slots,
            retry,
            total_requests: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Execute one logical call against a single provider.
    ///
    /// Acquires a rate-limit permit, then a concurrency slot (held across
    /// retries), then tries up to the configured attempt count with
    /// `base_delay * 2^attempt` sleeps between failures. The last provider
    /// error is propagated unmodified inside
    /// `DispatchError::ProviderCallFailed`; cancellation and deadline
    /// overruns abort immediately at any suspension point.
    pub async fn execute(
        &self,
        provider: &dyn Provider,
        request: &ProviderRequest,
        ctx: &DispatchContext,
    ) -> Result<ProviderResponse, DispatchError> {
        let started = Instant::now();
        let request_id = ctx.request_id();
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        debug!(
            request_id = %request_id,
            provider = provider.kind().id(),
            "dispatching provider call"
        );

        let outcome = async {
            self.rate_limiter.acquire(ctx).await?;
            let _slot = self.slots.acquire(ctx).await?;

            let mut last_error: Option<ProviderError> = None;
            for attempt in 0..self.retry.attempts {
                if attempt > 0 {
                    let delay = self.retry.backoff_delay(attempt - 1);
                    warn!(
                        request_id = %request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "provider call failed, retrying after backoff"
                    );
                    ctx.sleep(delay).await?;
                }

                match ctx.run(provider.send(request)).await? {
                    Ok(response) => return Ok(response),
                    Err(error) => {
                        warn!(
                            request_id = %request_id,
                            provider = provider.kind().id(),
                            attempt = attempt + 1,
                            error = %error,
                            "provider call attempt failed"
                        );
                        last_error = Some(error);
                    }
                }
            }

            Err(DispatchError::ProviderCallFailed {
                attempts: self.retry.attempts,
                source: last_error.unwrap_or_else(|| {
                    ProviderError::network_error("no attempt was made".to_string())
                }),
            })
        }
        .await;

        match outcome {
            Ok(mut response) => {
                let elapsed = started.elapsed();
                self.total_tokens
                    .fetch_add(response.usage.total_tokens, Ordering::SeqCst);
                info!(
                    request_id = %request_id,
                    provider = response.provider.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    tokens = response.usage.total_tokens,
                    "provider call completed"
                );
                response.request_id = Some(request_id);
                response.processing_time = Some(elapsed);
                Ok(response)
            }
            Err(error) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    /// Read-only counters snapshot; safe to poll while calls are in flight.
    pub fn stats(&self) -> DispatcherStats {
        let total_requests = self.total_requests.load(Ordering::SeqCst);
        let error_count = self.error_count.load(Ordering::SeqCst);
        DispatcherStats {
            total_requests,
            total_tokens: self.total_tokens.load(Ordering::SeqCst),
            error_count,
            success_rate: (total_requests.saturating_sub(error_count)) as f64
                / total_requests.max(1) as f64,
        }
    }

    /// In-flight slot counters, for observability.
    pub fn slot_status(&self) -> super::SlotStatus {
        self.slots.status()
    }
}
