//! Normalised error taxonomy for provider and notification HTTP calls

use std::fmt;

/// Classification of a failed API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection could not be established or was reset
    Transport,
    /// The request exceeded its timeout
    Timeout,
    /// HTTP 429 after the rate-limit retry was spent
    RateLimited,
    /// HTTP 5xx
    Server,
    /// HTTP 4xx other than 404 and 429
    Client,
    /// HTTP 404
    NotFound,
    /// Response body did not have the expected shape
    Decode,
    /// The request could not be built (bad URL, missing field)
    InvalidRequest,
}

impl ApiErrorKind {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiErrorKind::Transport
                | ApiErrorKind::Timeout
                | ApiErrorKind::Server
                | ApiErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::Transport => "transport error",
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::RateLimited => "rate limited",
            ApiErrorKind::Server => "server error",
            ApiErrorKind::Client => "client error",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::Decode => "decode error",
            ApiErrorKind::InvalidRequest => "invalid request",
        };
        f.write_str(name)
    }
}

/// Terminal error from an API call. `message` is always sanitised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}: {message}", format_status(.status))]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-2xx HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => ApiErrorKind::NotFound,
            429 => ApiErrorKind::RateLimited,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Client,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
