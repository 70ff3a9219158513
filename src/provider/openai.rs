//! OpenAI chat-completions API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{classify_http_status, ProviderError, ProviderErrorKind};
use super::{Provider, ProviderKind, ProviderRequest, ProviderResponse, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (proxy or test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok().map(Duration::from_secs))
    }

    fn create_error(
        status: reqwest::StatusCode,
        body: &str,
        retry_after: Option<Duration>,
    ) -> ProviderError {
        let status_code = status.as_u16();
        match classify_http_status(status_code) {
            ProviderErrorKind::RateLimited => {
                ProviderError::rate_limited(body.to_string(), retry_after)
            }
            ProviderErrorKind::ClientError => {
                ProviderError::client_error(status_code, body.to_string())
            }
            _ => ProviderError::server_error(status_code, body.to_string()),
        }
    }

    /// Chat-completions carries the system instruction as a leading
    /// `system`-role message.
    fn build_body<'a>(&'a self, request: &'a ProviderRequest) -> ChatBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &message.content,
            });
        }

        ChatBody {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.build_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return Err(if e.is_timeout() {
                    ProviderError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    ProviderError::network_error(format!("Connection failed: {}", e))
                } else {
                    ProviderError::network_error(format!("Request failed: {}", e))
                });
            }
        };

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Self::create_error(status, &text, retry_after));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::parse_error(format!("Failed to parse response: {}, body: {}", e, text))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::parse_error("No choices in response".to_string()))?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: Usage::new(parsed.usage.prompt_tokens, parsed.usage.completion_tokens),
            model: parsed.model,
            role: Role::Assistant,
            provider: ProviderKind::OpenAi,
            request_id: None,
            processing_time: None,
        })
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
