use crate::api::RetryPolicy;
use crate::providers::Provider;
use crate::utils::sanitize::mask_token;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global settings (`snapshots.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub directories: DirectoriesConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LogSettings,
    #[serde(default)]
    pub telegram: TelegramDefaults,
    #[serde(default)]
    pub webhook: WebhookDefaults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoriesConfig {
    /// Directory holding one JSON file per server
    #[serde(default = "default_configs_dir")]
    pub configs_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            configs_dir: default_configs_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Created inside `logs_dir`
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            lock_file: default_lock_file(),
        }
    }
}

/// Timing settings, all in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_delay_between_servers")]
    pub delay_between_servers: u64,
    /// Maximum wait for a snapshot action to complete
    #[serde(default = "default_snapshot_creation_timeout")]
    pub snapshot_creation_timeout: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            delay_between_servers: default_delay_between_servers(),
            snapshot_creation_timeout: default_snapshot_creation_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Provider API client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Total attempts per request
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_between_retries: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Cap for a single backoff delay
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            base_delay_between_retries: default_base_delay(),
            request_timeout: default_request_timeout(),
            max_delay: default_max_delay(),
        }
    }
}

impl ApiConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_secs(self.base_delay_between_retries))
            .with_max_delay(Duration::from_secs(self.max_delay))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Rotated log files to keep
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_log_max_files(),
        }
    }
}

/// Global Telegram fallbacks. Unset fields fall through to built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelegramDefaults {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub base_delay_between_retries: Option<u64>,
    #[serde(default)]
    pub message_success: Option<String>,
    #[serde(default)]
    pub message_failure: Option<String>,
    /// Bot API endpoint, overridable for self-hosted Bot API servers
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Global webhook fallbacks. Payloads may be a JSON string or an inline table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookDefaults {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub base_delay_between_retries: Option<u64>,
    #[serde(default)]
    pub payload_success: Option<Value>,
    #[serde(default)]
    pub payload_failure: Option<Value>,
}

/// Filesystem locations after resolving relative paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub configs_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub log_file: String,
    pub lock_file: PathBuf,
}

impl GlobalConfig {
    /// Resolve directories against `base_dir` (the settings file's directory)
    pub fn paths(&self, base_dir: &Path) -> ResolvedPaths {
        let resolve = |p: &Path| {
            let expanded = super::expand_tilde(p);
            if expanded.is_absolute() {
                expanded
            } else {
                base_dir.join(expanded)
            }
        };

        let logs_dir = resolve(&self.directories.logs_dir);
        ResolvedPaths {
            configs_dir: resolve(&self.directories.configs_dir),
            lock_file: logs_dir.join(&self.files.lock_file),
            log_file: self.files.log_file.clone(),
            logs_dir,
        }
    }
}

/// One server, loaded from its JSON file
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    pub provider: Provider,
    pub id: String,
    pub name: String,
    pub api_token: String,
    pub retain_last_snapshots: u32,
    pub telegram: Option<TelegramOverrides>,
    pub webhook: Option<WebhookOverrides>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("provider", &self.provider)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_token", &mask_token(&self.api_token))
            .field("retain_last_snapshots", &self.retain_last_snapshots)
            .field("telegram", &self.telegram.is_some())
            .field("webhook", &self.webhook.is_some())
            .finish()
    }
}

/// Per-server Telegram settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TelegramOverrides {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message_success: Option<String>,
    #[serde(default)]
    pub message_failure: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub base_delay_between_retries: Option<u64>,
}

/// Per-server webhook settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WebhookOverrides {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payload_success: Option<Value>,
    #[serde(default)]
    pub payload_failure: Option<Value>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub base_delay_between_retries: Option<u64>,
}

/// Chat ids are often written as numbers (`-1001234`) in server files
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// Default value functions

fn default_configs_dir() -> PathBuf { PathBuf::from("configs") }
fn default_logs_dir() -> PathBuf { PathBuf::from("logs") }
fn default_log_file() -> String { "snapshots.log".to_string() }
fn default_lock_file() -> String { "snapshots.lock".to_string() }
fn default_delay_between_servers() -> u64 { 5 }
fn default_snapshot_creation_timeout() -> u64 { 900 }
fn default_poll_interval() -> u64 { 5 }
fn default_retries() -> u32 { 3 }
fn default_base_delay() -> u64 { 2 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_delay() -> u64 { 60 }
fn default_log_level() -> String { "debug".to_string() }
fn default_log_max_files() -> usize { 5 }
