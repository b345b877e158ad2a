//! Provider-agnostic HTTP plumbing: transport seam, retry policy and the
//! authenticated API client shared by provider adapters and notifications.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{ApiClient, ErrorDecoder};
pub use error::{ApiError, ApiErrorKind};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError};
