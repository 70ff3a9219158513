//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{classify_http_status, ProviderError, ProviderErrorKind};
use super::{Provider, ProviderKind, ProviderRequest, ProviderResponse, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
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

    /// Parse Retry-After header if present.
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

    /// Split the conversation into the wire shape: system-role messages are
    /// folded into the `system` parameter, everything else stays inline.
    fn build_body<'a>(&'a self, request: &'a ProviderRequest) -> MessagesBody<'a> {
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(system) = &request.system {
            system_parts.push(system);
        }

        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(&message.content),
                Role::User => messages.push(WireMessage {
                    role: "user",
                    content: &message.content,
                }),
                Role::Assistant => messages.push(WireMessage {
                    role: "assistant",
                    content: &message.content,
                }),
            }
        }

        MessagesBody {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.build_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        let response = match self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::parse_error(format!("Failed to parse response: {}, body: {}", e, text))
        })?;

        let content = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderResponse {
            content,
            usage: Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            model: parsed.model,
            role: Role::Assistant,
            provider: ProviderKind::Anthropic,
            request_id: None,
            processing_time: None,
        })
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn system_messages_fold_into_system_parameter() {
        let provider = AnthropicProvider::new("key".into(), "claude-sonnet-4-20250514".into());
        let request = ProviderRequest::new(vec![
            Message::system("You are terse."),
            Message::user("hi"),
        ])
        .with_system("Always answer in English.");

        let body = provider.build_body(&request);
        assert_eq!(
            body.system.as_deref(),
            Some("Always answer in English.\n\nYou are terse.")
        );
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
    }

    #[test]
    fn parses_messages_response() {
        let raw = r#"{
            "content": [{"type": "text", "text": "Hello!"}],
            "model": "claude-sonnet-4-20250514",
            "role": "assistant",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        }"#;

        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "Hello!");
        assert_eq!(parsed.usage.input_tokens, 12);
        assert_eq!(parsed.usage.output_tokens, 4);
    }
}
