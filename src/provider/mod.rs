//! Provider module - a trait-based abstraction over generative-text
//! providers, with Anthropic and OpenAI as the bundled implementations.
//!
//! Every provider answers with the same unified `ProviderResponse` shape
//! (content, usage counters, model id, provider tag), so callers never
//! need to know which provider handled a request.

mod anthropic;
mod error;
mod openai;
mod router;

pub use anthropic::AnthropicProvider;
pub use error::{classify_http_status, ProviderError, ProviderErrorKind};
pub use openai::OpenAiProvider;
pub use router::{ProviderRouter, RouterError};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A structured request to a generative-text provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    /// Optional system instruction, kept separate from the message list.
    pub system: Option<String>,
    /// Upper bound on generated output size.
    pub max_tokens: u32,
    /// Sampling temperature (0 = deterministic).
    pub temperature: f32,
    /// Whether the caller wants a streamed response. The bundled HTTP
    /// providers answer non-streaming requests either way.
    pub stream: bool,
}

impl ProviderRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system: None,
            max_tokens: 4096,
            temperature: 0.7,
            stream: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Token usage counters for one provider call.
///
/// # Invariants
/// - `total_tokens == input_tokens + output_tokens` (enforced in
///   constructor, saturating)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Create a usage record ensuring `total_tokens` is consistent.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Component-wise sum of two usage records.
    pub fn add(&self, other: &Usage) -> Usage {
        Usage::new(
            self.input_tokens.saturating_add(other.input_tokens),
            self.output_tokens.saturating_add(other.output_tokens),
        )
    }
}

/// The unified response shape all providers map into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated content.
    pub content: String,
    /// Token counters reported by the provider.
    pub usage: Usage,
    /// Model that answered.
    pub model: String,
    /// Role of the generated message.
    pub role: Role,
    /// Which provider answered (set by the implementation).
    pub provider: ProviderKind,
    /// Correlation id, filled in by the dispatcher.
    pub request_id: Option<String>,
    /// Wall-clock time of the whole dispatch, filled in by the dispatcher.
    pub processing_time: Option<Duration>,
}

/// Known provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "anthropic" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Anthropic => "Anthropic",
            Self::OpenAi => "OpenAI",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Trait for generative-text providers.
///
/// Implementations are interchangeable behind the router: any error from
/// `send` is treated opaquely and triggers retry/failover upstream.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Send one request and map the answer into the unified shape.
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Cheap connectivity check: asks the provider to answer "OK".
    async fn probe(&self) -> bool {
        let request = ProviderRequest::new(vec![Message::user(
            "Hello, please respond with 'OK' to confirm the connection.",
        )])
        .with_max_tokens(16)
        .with_temperature(0.0);

        match self.send(&request).await {
            Ok(response) => response.content.to_uppercase().contains("OK"),
            Err(_) => false,
        }
    }
}
