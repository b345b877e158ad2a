//! Authenticated JSON API client with retry, backoff and rate-limit handling

use super::error::{ApiError, ApiErrorKind};
use super::retry::{RetryPolicy, Sleeper};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::utils::sanitize::sanitize_with;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Extracts a human-readable message from a provider error body
pub type ErrorDecoder = fn(&str) -> Option<String>;

/// Longest error message kept from a response body
const MAX_ERROR_LEN: usize = 200;

/// Upper bound on a server-requested `Retry-After` wait
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// HTTP client shared by provider adapters and notification channels.
///
/// Every request goes through [`ApiClient::request`], which applies the
/// retry policy:
/// - 2xx is returned as-is
/// - 429 with `Retry-After` sleeps that long and retries exactly once more,
///   without consuming an attempt; a second 429 is terminal
/// - 429 without `Retry-After`, 5xx and transport failures back off
///   exponentially until attempts run out
/// - any other 4xx is terminal immediately
pub struct ApiClient {
    label: String,
    base_url: String,
    bearer_token: Option<String>,
    secrets: Vec<String>,
    policy: RetryPolicy,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    error_decoder: ErrorDecoder,
}

impl ApiClient {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            label: label.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
            secrets: Vec::new(),
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            transport,
            sleeper,
            error_decoder: no_decoder,
        }
    }

    /// Authenticate every request with `Authorization: Bearer <token>`.
    /// The token is also registered as a secret for sanitisation.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.secrets.push(token.clone());
        self.bearer_token = Some(token);
        self
    }

    /// Register a value that must never appear in logs or error messages
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error_decoder(mut self, decoder: ErrorDecoder) -> Self {
        self.error_decoder = decoder;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Mask every registered secret and known credential pattern
    pub fn sanitize(&self, text: &str) -> String {
        sanitize_with(text, &self.secrets)
    }

    fn build_url(&self, path_or_url: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let raw = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}/{}", self.base_url, path_or_url.trim_start_matches('/'))
        };

        let url = if query.is_empty() {
            reqwest::Url::parse(&raw)
        } else {
            reqwest::Url::parse_with_params(&raw, query.iter().map(|(k, v)| (*k, v.as_str())))
        };

        url.map(|u| u.to_string()).map_err(|e| {
            ApiError::new(
                ApiErrorKind::InvalidRequest,
                format!("invalid URL '{}': {}", self.sanitize(&raw), e),
            )
        })
    }

    fn error_from_response(&self, response: &HttpResponse) -> ApiError {
        let message = (self.error_decoder)(&response.body)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if response.body.trim().is_empty() {
                    format!("HTTP {}", response.status)
                } else {
                    response.body.trim().to_string()
                }
            });
        ApiError::from_status(response.status, truncate(&self.sanitize(&message), MAX_ERROR_LEN))
    }

    fn error_from_transport(&self, error: &super::transport::TransportError) -> ApiError {
        let kind = if error.timed_out {
            ApiErrorKind::Timeout
        } else {
            ApiErrorKind::Transport
        };
        ApiError::new(kind, truncate(&self.sanitize(&error.message), MAX_ERROR_LEN))
    }

    /// Send a request, applying the retry policy
    pub fn request(
        &self,
        method: Method,
        path_or_url: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.build_url(path_or_url, query)?;

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(ref token) = self.bearer_token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
            timeout: self.timeout,
        };
        let logged_url = self.sanitize(&request.url);

        let mut attempt: u32 = 1;
        let mut rate_limit_retry_used = false;

        loop {
            debug!(
                "{} {} {} (attempt {}/{})",
                self.label, method, logged_url, attempt, self.policy.retries
            );

            let failure = match self.transport.execute(&request) {
                Ok(response) if response.is_success() => {
                    debug!("{} {} {} -> {}", self.label, method, logged_url, response.status);
                    return Ok(response);
                }
                Ok(response) => {
                    let error = self.error_from_response(&response);

                    if response.status == 429 {
                        if let Some(wait) = response.retry_after() {
                            if rate_limit_retry_used {
                                warn!("{}: still rate limited after waiting, giving up", self.label);
                                return Err(error);
                            }
                            rate_limit_retry_used = true;
                            let wait = wait.min(MAX_RETRY_AFTER);
                            warn!(
                                "{}: rate limited, retrying once after {}s (Retry-After)",
                                self.label,
                                wait.as_secs()
                            );
                            self.sleeper.sleep(wait);
                            continue;
                        }
                    }

                    if !error.is_transient() {
                        debug!("{}: permanent failure: {}", self.label, error);
                        return Err(error);
                    }
                    error
                }
                Err(transport_error) => self.error_from_transport(&transport_error),
            };

            if attempt >= self.policy.retries {
                warn!(
                    "{}: giving up after {} attempt(s): {}",
                    self.label, attempt, failure
                );
                return Err(failure);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                "{}: attempt {}/{} failed ({}), retrying in {}s",
                self.label,
                attempt,
                self.policy.retries,
                failure,
                delay.as_secs()
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }

    /// GET and decode a JSON body
    pub fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let response = self.request(Method::Get, path, query, None)?;
        self.decode(&response)
    }

    /// POST a JSON body and decode the JSON response. An empty response
    /// body decodes to `Value::Null`.
    pub fn post_json(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let response = self.request(Method::Post, path, &[], Some(body))?;
        self.decode(&response)
    }

    pub fn delete(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.request(Method::Delete, path, &[], None)
    }

    fn decode(&self, response: &HttpResponse) -> Result<Value, ApiError> {
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| {
            ApiError::decode(format!("{}: invalid JSON response: {}", self.label, e))
        })
    }
}

fn no_decoder(_body: &str) -> Option<String> {
    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}
