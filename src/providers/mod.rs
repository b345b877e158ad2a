//! Provider adapters behind a common snapshot capability set
//!
//! Each adapter is bound to a single server and hides endpoint and
//! response-shape differences, so the orchestrator only sees
//! [`SnapshotProvider`].

pub mod digitalocean;
pub mod hetzner;

pub use digitalocean::DigitalOceanProvider;
pub use hetzner::HetznerProvider;

use crate::api::{ApiClient, ApiError, HttpTransport, Sleeper};
use crate::config::{ApiConfig, ServerConfig};
use crate::error::SnapshotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    DigitalOcean,
    Hetzner,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::DigitalOcean => "digitalocean",
            Provider::Hetzner => "hetzner",
        }
    }

    /// Top-level key identifying the provider in a server file
    pub fn config_key(&self) -> &'static str {
        match self {
            Provider::DigitalOcean => "digitalocean_droplet",
            Provider::Hetzner => "hetzner_cloud_server",
        }
    }

    pub fn from_config_key(key: &str) -> Option<Self> {
        [Provider::DigitalOcean, Provider::Hetzner]
            .into_iter()
            .find(|p| p.config_key() == key)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digitalocean" => Ok(Provider::DigitalOcean),
            "hetzner" => Ok(Provider::Hetzner),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// A provider-side point-in-time image of a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub provider: Provider,
}

/// Token for an asynchronous provider action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle {
    pub action_id: String,
    pub provider: Provider,
    /// Image created by the action, when the provider reports one up front
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Done,
    Errored,
}

/// The server an adapter operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub id: String,
    pub name: String,
}

impl ServerTarget {
    /// Prefix shared by every snapshot this tool names for the server
    pub fn snapshot_prefix(&self) -> String {
        format!("{}-", self.name)
    }
}

/// Snapshot operations for one server
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotProvider {
    fn provider(&self) -> Provider;

    /// Every snapshot belonging to the server, across all pages
    fn list_snapshots(&self) -> Result<Vec<Snapshot>, ApiError>;

    /// Start creating a snapshot named `name`
    fn create_snapshot(&self, name: &str) -> Result<ActionHandle, ApiError>;

    fn poll_action(&self, handle: &ActionHandle) -> Result<ActionStatus, ApiError>;

    /// Delete a snapshot. Already-deleted snapshots count as success.
    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), ApiError>;
}

/// Identifier that providers send either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum FlexibleId {
    Number(u64),
    Text(String),
}

impl fmt::Display for FlexibleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlexibleId::Number(n) => write!(f, "{}", n),
            FlexibleId::Text(s) => f.write_str(s),
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(
    body: serde_json::Value,
    what: &str,
) -> Result<T, ApiError> {
    serde_json::from_value(body)
        .map_err(|e| ApiError::decode(format!("unexpected {} response: {}", what, e)))
}

/// Fixed-interval polling bounded by a total wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            max_wait,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(900))
    }
}

/// Poll `handle` until it reaches a terminal state.
///
/// The wait budget is measured on the sleeper's clock, so backoff inside a
/// poll request and request latency both count against it. Transient poll
/// errors are logged and polling continues; permanent ones end the wait.
pub fn wait_for_action(
    provider: &dyn SnapshotProvider,
    handle: &ActionHandle,
    poll: &PollSettings,
    sleeper: &dyn Sleeper,
) -> Result<(), SnapshotError> {
    let started = sleeper.now();

    loop {
        match provider.poll_action(handle) {
            Ok(ActionStatus::Done) => {
                debug!(
                    "Action {} completed after ~{}s",
                    handle.action_id,
                    sleeper.now().saturating_duration_since(started).as_secs()
                );
                return Ok(());
            }
            Ok(ActionStatus::Errored) => {
                return Err(SnapshotError::ActionFailed {
                    action_id: handle.action_id.clone(),
                });
            }
            Ok(ActionStatus::Pending) => {
                debug!("Action {} still in progress", handle.action_id);
            }
            Err(e) if e.is_transient() => {
                warn!("Polling action {} failed, will retry: {}", handle.action_id, e);
            }
            Err(e) => return Err(e.into()),
        }

        let waited = sleeper.now().saturating_duration_since(started);
        if waited >= poll.max_wait {
            return Err(SnapshotError::PollTimeout {
                action_id: handle.action_id.clone(),
                waited_secs: waited.as_secs(),
            });
        }

        sleeper.sleep(poll.interval.min(poll.max_wait - waited));
    }
}

/// Build the adapter for `server`'s provider
pub fn adapter_for(
    server: &ServerConfig,
    api: &ApiConfig,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
) -> Box<dyn SnapshotProvider> {
    let target = ServerTarget {
        id: server.id.clone(),
        name: server.name.clone(),
    };

    let client = |label: &str, base_url: &str| {
        ApiClient::new(label, base_url, transport.clone(), sleeper.clone())
            .with_bearer_token(server.api_token.clone())
            .with_retry_policy(api.retry_policy())
            .with_timeout(api.timeout())
    };

    match server.provider {
        Provider::DigitalOcean => Box::new(DigitalOceanProvider::new(
            client("digitalocean", digitalocean::API_BASE),
            target,
        )),
        Provider::Hetzner => Box::new(HetznerProvider::new(client("hetzner", hetzner::API_BASE), target)),
    }
}
