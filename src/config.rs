//! Configuration for the coordination core.
//!
//! Configuration can be set via environment variables:
//! - `RATE_LIMIT_MAX_REQUESTS` - Optional. Calls admitted per rolling window. Defaults to `100`.
//! - `RATE_LIMIT_WINDOW_SECS` - Optional. Rolling window length in seconds. Defaults to `60`.
//! - `MAX_CONCURRENT_REQUESTS` - Optional. Simultaneous in-flight provider calls. Defaults to `5`.
//! - `RETRY_ATTEMPTS` - Optional. Attempts per provider call. Defaults to `3`.
//! - `RETRY_BASE_DELAY_MS` - Optional. Backoff base delay in milliseconds. Defaults to `1000`.
//! - `PRIMARY_PROVIDER` - Optional. `anthropic` or `openai`. Defaults to `openai`.
//! - `FALLBACK_PROVIDER` - Optional. `anthropic` or `openai`. Defaults to `anthropic`.
//! - `ANTHROPIC_API_KEY` - Optional. Enables the Anthropic provider.
//! - `ANTHROPIC_MODEL` - Optional. Defaults to `claude-sonnet-4-20250514`.
//! - `OPENAI_API_KEY` - Optional. Enables the OpenAI provider.
//! - `OPENAI_MODEL` - Optional. Defaults to `gpt-4o-mini`.

use std::time::Duration;

use thiserror::Error;

use crate::dispatch::{RateLimitConfig, RetryPolicy};
use crate::provider::ProviderKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Coordination core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sliding-window rate limit shared by all agents
    pub rate_limit: RateLimitConfig,

    /// Maximum simultaneous in-flight provider calls
    pub max_concurrent_requests: usize,

    /// Retry attempts and backoff base per provider call
    pub retry: RetryPolicy,

    /// Provider tried first for every call
    pub primary_provider: Option<ProviderKind>,

    /// Provider tried when the primary fails
    pub fallback_provider: Option<ProviderKind>,

    /// Anthropic credentials (provider enabled when set)
    pub anthropic_api_key: Option<String>,

    /// Anthropic model identifier
    pub anthropic_model: String,

    /// OpenAI credentials (provider enabled when set)
    pub openai_api_key: Option<String>,

    /// OpenAI model identifier
    pub openai_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            max_concurrent_requests: 5,
            retry: RetryPolicy::default(),
            primary_provider: Some(ProviderKind::OpenAi),
            fallback_provider: Some(ProviderKind::Anthropic),
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set to a
    /// value that does not parse (or names an unknown provider).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests)?;
        let window_secs = parse_var(
            "RATE_LIMIT_WINDOW_SECS",
            defaults.rate_limit.window.as_secs(),
        )?;
        let max_concurrent_requests =
            parse_var("MAX_CONCURRENT_REQUESTS", defaults.max_concurrent_requests)?;
        let attempts = parse_var("RETRY_ATTEMPTS", defaults.retry.attempts)?;
        let base_delay_ms = parse_var(
            "RETRY_BASE_DELAY_MS",
            defaults.retry.base_delay.as_millis() as u64,
        )?;

        let primary_provider = parse_provider("PRIMARY_PROVIDER")?.or(defaults.primary_provider);
        let fallback_provider =
            parse_provider("FALLBACK_PROVIDER")?.or(defaults.fallback_provider);

        Ok(Self {
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            max_concurrent_requests,
            retry: RetryPolicy {
                attempts,
                base_delay: Duration::from_millis(base_delay_ms),
            },
            primary_provider,
            fallback_provider,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or(defaults.anthropic_model),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn parse_provider(name: &str) -> Result<Option<ProviderKind>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => ProviderKind::from_id(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(None),
    }
}
