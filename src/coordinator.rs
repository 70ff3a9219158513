//! Composition root: wires configuration into the shared dispatch stack
//! and the agent pool.
//!
//! Nothing in the crate is an ambient global; the `Coordinator` owns the
//! process-scoped pieces (rate limiter, slots, dispatcher, router, pool)
//! and hands out the handles agents and callers need. Construct one at
//! startup and pass it down.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::agent::{Agent, AgentPool, Worker};
use crate::config::Config;
use crate::dispatch::{ConcurrencySlots, RateLimiter, RetryingDispatcher};
use crate::provider::{AnthropicProvider, OpenAiProvider, Provider, ProviderRouter};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Neither provider has credentials configured.
    #[error("no provider available: configure at least one API key")]
    NoProvidersConfigured,
}

/// Process-scoped owner of the dispatch stack and the agent pool.
pub struct Coordinator {
    config: Config,
    dispatcher: Arc<RetryingDispatcher>,
    router: Arc<ProviderRouter>,
    pool: AgentPool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Wire the dispatch stack around explicitly supplied providers.
    pub fn new(config: Config, providers: Vec<Arc<dyn Provider>>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        let slots = ConcurrencySlots::new(config.max_concurrent_requests);
        let dispatcher = Arc::new(RetryingDispatcher::new(
            rate_limiter,
            slots,
            config.retry.clone(),
        ));
        let router = Arc::new(ProviderRouter::with_priority(
            Arc::clone(&dispatcher),
            providers,
            config.primary_provider,
            config.fallback_provider,
        ));
        info!(
            providers = ?router.available(),
            max_concurrent = config.max_concurrent_requests,
            "coordinator initialized"
        );

        Self {
            config,
            dispatcher,
            router,
            pool: AgentPool::new(),
        }
    }

    /// Build providers from the configured API keys.
    ///
    /// # Errors
    ///
    /// `CoordinatorError::NoProvidersConfigured` when no key is set.
    pub fn from_config(config: Config) -> Result<Self, CoordinatorError> {
        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
        if let Some(key) = &config.openai_api_key {
            providers.push(Arc::new(OpenAiProvider::new(
                key.clone(),
                config.openai_model.clone(),
            )));
        }
        if let Some(key) = &config.anthropic_api_key {
            providers.push(Arc::new(AnthropicProvider::new(
                key.clone(),
                config.anthropic_model.clone(),
            )));
        }
        if providers.is_empty() {
            return Err(CoordinatorError::NoProvidersConfigured);
        }
        Ok(Self::new(config, providers))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared provider router, for workers that call providers.
    pub fn router(&self) -> Arc<ProviderRouter> {
        Arc::clone(&self.router)
    }

    /// Cumulative dispatch statistics.
    pub fn dispatcher(&self) -> &RetryingDispatcher {
        &self.dispatcher
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    /// Create an agent around a worker and register it in the pool.
    pub async fn spawn_agent(&self, agent_type: impl Into<String>, worker: Arc<dyn Worker>) -> Agent {
        let agent = Agent::new(agent_type, worker);
        self.pool.register(agent.clone()).await;
        agent
    }
}
