//! Provider router: ordered failover across interchangeable providers.
//!
//! For one logical call the router walks its candidate list in priority
//! order, giving each provider a full dispatch (rate limit, slot, retry
//! budget) before moving on. A caller-preferred provider, when
//! configured, is tried first regardless of default order.

use std::sync::Arc;

use tracing::{info, warn};

use super::{Provider, ProviderKind, ProviderRequest, ProviderResponse};
use crate::dispatch::{DispatchContext, DispatchError, RetryingDispatcher};

/// Routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Every candidate provider failed for this call. Carries the last
    /// underlying error; not retried further at this layer.
    #[error("all providers exhausted for request {request_id}: {last_error}")]
    AllProvidersExhausted {
        request_id: String,
        #[source]
        last_error: DispatchError,
    },

    /// The caller's cancellation token or deadline fired mid-dispatch;
    /// no failover is attempted.
    #[error(transparent)]
    Interrupted(DispatchError),

    /// The router has no providers at all.
    #[error("no providers configured")]
    NoProviders,
}

/// Ordered list of interchangeable providers behind one dispatcher.
pub struct ProviderRouter {
    providers: Vec<Arc<dyn Provider>>,
    dispatcher: Arc<RetryingDispatcher>,
}

impl ProviderRouter {
    /// Build a router that tries providers in the order given.
    pub fn new(dispatcher: Arc<RetryingDispatcher>, providers: Vec<Arc<dyn Provider>>) -> Self {
        Self {
            providers,
            dispatcher,
        }
    }

    /// Build a router ordered by a primary/fallback designation.
    ///
    /// The primary (if configured and present) goes first, the fallback
    /// second; any remaining configured providers keep their given order
    /// after those.
    pub fn with_priority(
        dispatcher: Arc<RetryingDispatcher>,
        providers: Vec<Arc<dyn Provider>>,
        primary: Option<ProviderKind>,
        fallback: Option<ProviderKind>,
    ) -> Self {
        let mut ordered: Vec<Arc<dyn Provider>> = Vec::with_capacity(providers.len());
        for wanted in [primary, fallback].into_iter().flatten() {
            if let Some(provider) = providers.iter().find(|p| p.kind() == wanted) {
                if !ordered.iter().any(|p| p.kind() == wanted) {
                    ordered.push(Arc::clone(provider));
                }
            }
        }
        for provider in &providers {
            if !ordered.iter().any(|p| p.kind() == provider.kind()) {
                ordered.push(Arc::clone(provider));
            }
        }

        info!(
            order = ?ordered.iter().map(|p| p.kind().id()).collect::<Vec<_>>(),
            "provider priority resolved"
        );
        Self::new(dispatcher, ordered)
    }

    /// Provider kinds in their current priority order.
    pub fn available(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub fn has(&self, kind: ProviderKind) -> bool {
        self.providers.iter().any(|p| p.kind() == kind)
    }

    /// Execute one logical call with failover.
    ///
    /// Tries the preferred provider first when it is configured, then the
    /// default order, skipping duplicates. Cancellation and deadline
    /// overruns are the caller's signal and propagate immediately instead
    /// of failing over.
    pub async fn dispatch(
        &self,
        request: &ProviderRequest,
        preferred: Option<ProviderKind>,
        ctx: &DispatchContext,
    ) -> Result<ProviderResponse, RouterError> {
        if self.providers.is_empty() {
            return Err(RouterError::NoProviders);
        }

        let mut candidates: Vec<&Arc<dyn Provider>> = Vec::with_capacity(self.providers.len());
        if let Some(wanted) = preferred {
            if let Some(provider) = self.providers.iter().find(|p| p.kind() == wanted) {
                candidates.push(provider);
            }
        }
        for provider in &self.providers {
            if !candidates.iter().any(|c| c.kind() == provider.kind()) {
                candidates.push(provider);
            }
        }

        let mut last_error: Option<DispatchError> = None;
        for provider in candidates {
            info!(provider = provider.kind().id(), label = ctx.label(), "trying provider");
            match self.dispatcher.execute(provider.as_ref(), request, ctx).await {
                Ok(response) => return Ok(response),
                Err(error @ (DispatchError::Cancelled | DispatchError::DeadlineExceeded)) => {
                    return Err(RouterError::Interrupted(error));
                }
                Err(error) => {
                    warn!(
                        provider = provider.kind().id(),
                        error = %error,
                        "provider failed, trying next"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(RouterError::AllProvidersExhausted {
            request_id: ctx.request_id(),
            last_error: last_error.unwrap_or(DispatchError::ProviderCallFailed {
                attempts: 0,
                source: crate::provider::ProviderError::network_error(
                    "no provider was tried".to_string(),
                ),
            }),
        })
    }

    /// Probe every provider; returns `(kind, reachable)` pairs in priority
    /// order.
    pub async fn probe_all(&self) -> Vec<(ProviderKind, bool)> {
        let mut results = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            results.push((provider.kind(), provider.probe().await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ConcurrencySlots, RateLimiter, RetryPolicy};
    use crate::provider::{Message, ProviderError, Role, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedProvider {
        kind: ProviderKind,
        fail: bool,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn good(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: false,
                calls: AtomicU32::new(0),
            })
        }

        fn bad(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail: true,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn send(
            &self,
            _request: &ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::server_error(500, "down".to_string()));
            }
            Ok(ProviderResponse {
                content: format!("answer from {}", self.kind),
                usage: Usage::new(5, 5),
                model: "test-model".to_string(),
                role: Role::Assistant,
                provider: self.kind,
                request_id: None,
                processing_time: None,
            })
        }
    }

    fn dispatcher(attempts: u32) -> Arc<RetryingDispatcher> {
        Arc::new(RetryingDispatcher::new(
            RateLimiter::new(Default::default()),
            ConcurrencySlots::new(5),
            RetryPolicy {
                attempts,
                base_delay: Duration::from_millis(1),
            },
        ))
    }

    fn request() -> ProviderRequest {
        ProviderRequest::new(vec![Message::user("hello")])
    }

    #[tokio::test(start_paused = true)]
    async fn fails_over_to_the_next_provider() {
        let broken = ScriptedProvider::bad(ProviderKind::OpenAi);
        let healthy = ScriptedProvider::good(ProviderKind::Anthropic);
        let router = ProviderRouter::new(
            dispatcher(1),
            vec![broken.clone(), healthy.clone()],
        );

        let response = router
            .dispatch(&request(), None, &DispatchContext::new("test"))
            .await
            .unwrap();

        assert_eq!(response.provider, ProviderKind::Anthropic);
        assert_eq!(broken.calls(), 1);
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failing_providers_exhaust_the_router() {
        let router = ProviderRouter::new(
            dispatcher(1),
            vec![
                ScriptedProvider::bad(ProviderKind::OpenAi),
                ScriptedProvider::bad(ProviderKind::Anthropic),
            ],
        );

        let err = router
            .dispatch(&request(), None, &DispatchContext::new("test"))
            .await
            .unwrap_err();

        match err {
            RouterError::AllProvidersExhausted { last_error, .. } => {
                assert!(matches!(
                    last_error,
                    DispatchError::ProviderCallFailed { .. }
                ));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failover_gives_each_provider_its_own_retry_budget() {
        let broken = ScriptedProvider::bad(ProviderKind::OpenAi);
        let healthy = ScriptedProvider::good(ProviderKind::Anthropic);
        let router = ProviderRouter::new(
            dispatcher(3),
            vec![broken.clone(), healthy.clone()],
        );

        let response = router
            .dispatch(&request(), None, &DispatchContext::new("test"))
            .await
            .unwrap();

        // The failing provider burned its whole budget before failover.
        assert_eq!(broken.calls(), 3);
        assert_eq!(healthy.calls(), 1);
        assert_eq!(response.provider, ProviderKind::Anthropic);
    }

    #[tokio::test(start_paused = true)]
    async fn preferred_provider_is_tried_first() {
        let first = ScriptedProvider::good(ProviderKind::OpenAi);
        let second = ScriptedProvider::good(ProviderKind::Anthropic);
        let router = ProviderRouter::new(dispatcher(1), vec![first.clone(), second.clone()]);

        let response = router
            .dispatch(
                &request(),
                Some(ProviderKind::Anthropic),
                &DispatchContext::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(response.provider, ProviderKind::Anthropic);
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn priority_ordering_puts_primary_then_fallback_first() {
        let openai = ScriptedProvider::good(ProviderKind::OpenAi);
        let anthropic = ScriptedProvider::good(ProviderKind::Anthropic);
        let router = ProviderRouter::with_priority(
            dispatcher(1),
            vec![anthropic, openai],
            Some(ProviderKind::OpenAi),
            Some(ProviderKind::Anthropic),
        );

        assert_eq!(
            router.available(),
            vec![ProviderKind::OpenAi, ProviderKind::Anthropic]
        );
    }

    #[tokio::test]
    async fn empty_router_reports_no_providers() {
        let router = ProviderRouter::new(dispatcher(1), Vec::new());
        let err = router
            .dispatch(&request(), None, &DispatchContext::new("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NoProviders));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_overrun_does_not_fail_over() {
        let failing = ScriptedProvider::bad(ProviderKind::OpenAi);
        let healthy = ScriptedProvider::good(ProviderKind::Anthropic);
        // Long backoff so the deadline fires inside the first provider's
        // retry loop.
        let dispatcher = Arc::new(RetryingDispatcher::new(
            RateLimiter::new(Default::default()),
            ConcurrencySlots::new(5),
            RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_secs(60),
            },
        ));
        let router = ProviderRouter::new(dispatcher, vec![failing, healthy.clone()]);

        let ctx = DispatchContext::new("test").with_timeout(Duration::from_secs(5));
        let err = router.dispatch(&request(), None, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            RouterError::Interrupted(DispatchError::DeadlineExceeded)
        ));
        // The healthy provider was never consulted: the caller's bound wins.
        assert_eq!(healthy.calls(), 0);
    }
}
