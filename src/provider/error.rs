//! Provider error types with transience classification.
//!
//! The dispatcher retries any failed call, but the classification decides
//! logging detail and lets a `Retry-After` hint shorten or stretch the
//! backoff.

use std::time::Duration;

/// Error from a provider call.
#[derive(Debug)]
pub struct ProviderError {
    /// The kind of error
    pub kind: ProviderErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Suggested retry delay (from a Retry-After header)
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Create a rate limit error.
    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            status_code: Some(429),
            message,
            retry_after,
        }
    }

    /// Create a server error.
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self {
            kind: ProviderErrorKind::ServerError,
            status_code: Some(status_code),
            message,
            retry_after: None,
        }
    }

    /// Create a client error (bad request, auth, etc.).
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self {
            kind: ProviderErrorKind::ClientError,
            status_code: Some(status_code),
            message,
            retry_after: None,
        }
    }

    /// Create a network error.
    pub fn network_error(message: String) -> Self {
        Self {
            kind: ProviderErrorKind::NetworkError,
            status_code: None,
            message,
            retry_after: None,
        }
    }

    /// Create a parse error.
    pub fn parse_error(message: String) -> Self {
        Self {
            kind: ProviderErrorKind::ParseError,
            status_code: None,
            message,
            retry_after: None,
        }
    }

    /// Check if this error is transient (a retry may succeed).
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Classification of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limited (429) - transient
    RateLimited,
    /// Server error (500, 502, 503, 504) - transient
    ServerError,
    /// Client error (400, 401, 403, 404) - permanent
    ClientError,
    /// Network error (connection failed, timeout) - transient
    NetworkError,
    /// Response parsing error - usually permanent
    ParseError,
}

impl ProviderErrorKind {
    /// Check if this error kind is transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::RateLimited => write!(f, "Rate limited"),
            ProviderErrorKind::ServerError => write!(f, "Server error"),
            ProviderErrorKind::ClientError => write!(f, "Client error"),
            ProviderErrorKind::NetworkError => write!(f, "Network error"),
            ProviderErrorKind::ParseError => write!(f, "Parse error"),
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        500 | 502 | 503 | 504 => ProviderErrorKind::ServerError,
        400..=499 => ProviderErrorKind::ClientError,
        _ => ProviderErrorKind::ServerError,
    }
}
