//! HTTP transport abstraction for testability
//!
//! Every outbound call (provider APIs, Telegram, webhooks) goes through
//! [`HttpTransport`], so tests can swap the network for a scripted mock.

use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// HTTP methods used by the provider and notification APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A fully-built outbound request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Response as seen by the API client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Retry-After` in seconds. HTTP-date values are not supported and
    /// are treated as absent.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Connection-level failure (no HTTP status was received)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Abstraction over the HTTP stack, enabling mocking in tests
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default implementation backed by a blocking reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::new(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| TransportError {
            message: e.to_string(),
            timed_out: e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().map_err(|e| TransportError {
            message: format!("Failed to read response body: {}", e),
            timed_out: e.is_timeout(),
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// A mock transport for testing that records requests and replays
/// scripted responses.
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted reply for a route
    #[derive(Clone, Debug)]
    pub enum MockReply {
        Response(HttpResponse),
        Failure(TransportError),
    }

    #[derive(Debug)]
    struct Route {
        method: Method,
        url_fragment: String,
        replies: VecDeque<MockReply>,
    }

    /// Mock transport. Routes match on method plus a URL substring, first
    /// registered route wins. Queued replies are consumed in order and the
    /// last one repeats. Unmatched requests get a permanent 400.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        routes: Arc<Mutex<Vec<Route>>>,
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for requests matching `method` and `url_fragment`
        pub fn on(self, method: Method, url_fragment: &str, response: HttpResponse) -> Self {
            self.push(method, url_fragment, MockReply::Response(response));
            self
        }

        /// Queue a connection-level failure
        pub fn on_failure(self, method: Method, url_fragment: &str, error: TransportError) -> Self {
            self.push(method, url_fragment, MockReply::Failure(error));
            self
        }

        fn push(&self, method: Method, url_fragment: &str, reply: MockReply) {
            let mut routes = self.routes.lock().unwrap();
            if let Some(route) = routes
                .iter_mut()
                .find(|r| r.method == method && r.url_fragment == url_fragment)
            {
                route.replies.push_back(reply);
                return;
            }
            routes.push(Route {
                method,
                url_fragment: url_fragment.to_string(),
                replies: VecDeque::from(vec![reply]),
            });
        }

        /// All recorded requests, in order
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Number of requests matching `method` and `url_fragment`
        pub fn count(&self, method: Method, url_fragment: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.url.contains(url_fragment))
                .count()
        }

        /// Recorded requests matching `method` and `url_fragment`
        pub fn matching(&self, method: Method, url_fragment: &str) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.url.contains(url_fragment))
                .cloned()
                .collect()
        }

        fn next_reply(&self, request: &HttpRequest) -> MockReply {
            let mut routes = self.routes.lock().unwrap();
            let route = routes
                .iter_mut()
                .find(|r| r.method == request.method && request.url.contains(&r.url_fragment));

            match route {
                Some(route) if route.replies.len() > 1 => {
                    route.replies.pop_front().unwrap_or_else(no_route_reply)
                }
                Some(route) => route.replies.front().cloned().unwrap_or_else(no_route_reply),
                None => no_route_reply(),
            }
        }
    }

    fn no_route_reply() -> MockReply {
        MockReply::Response(HttpResponse::new(
            400,
            r#"{"id":"bad_request","message":"no mock route configured"}"#,
        ))
    }

    impl HttpTransport for MockTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.next_reply(request) {
                MockReply::Response(response) => Ok(response),
                MockReply::Failure(error) => Err(error),
            }
        }
    }
}
