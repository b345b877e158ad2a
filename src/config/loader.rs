use super::types::*;
use crate::providers::Provider;
use crate::utils::sanitize::sanitize;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Error parsing JSON file '{path}': {message}")]
    ParseJson { path: PathBuf, message: String },

    #[error("Configuration file '{0}' must contain either 'digitalocean_droplet' or 'hetzner_cloud_server' key")]
    UnknownProvider(PathBuf),

    #[error("Configuration file '{path}' is missing required field(s): {}", .fields.join(", "))]
    MissingFields { path: PathBuf, fields: Vec<String> },

    #[error("Invalid configuration in '{path}': {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Configs directory '{0}' does not exist")]
    MissingDirectory(PathBuf),

    #[error("Skipping non-JSON file '{0}'")]
    NotJson(PathBuf),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Values copied from sample files that mean "not configured"
const PLACEHOLDER_VALUES: &[&str] = &[
    "your_telegram_bot_token_here",
    "your_telegram_bot_token",
    "your_telegram_chat_id_here",
    "your_telegram_chat_id",
    "https://your-webhook-url.com/notify",
    "your-webhook-url.com",
    "your_webhook_url_here",
];

const REQUIRED_FIELDS: &[&str] = &["id", "name", "api_token", "retain_last_snapshots"];

/// Load and validate global settings from a TOML file
pub fn load_global_config<P: AsRef<Path>>(path: P) -> Result<GlobalConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GlobalConfig = toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    validate_global(&config)?;
    Ok(config)
}

fn validate_global(config: &GlobalConfig) -> Result<()> {
    if config.timing.poll_interval == 0 {
        return Err(ConfigError::ValidationError(
            "timing.poll_interval must be at least 1 second".to_string(),
        ));
    }

    if config.api.retries == 0 {
        return Err(ConfigError::ValidationError(
            "api.retries must be at least 1".to_string(),
        ));
    }

    if config.files.lock_file.trim().is_empty() || config.files.log_file.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "files.log_file and files.lock_file must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// `retain_last_snapshots` and `id` are accepted as numbers or strings
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Text(String),
}

/// Load one server file
pub fn load_server_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let contents = String::from_utf8(bytes).map_err(|_| ConfigError::ParseJson {
        path: path.to_path_buf(),
        message: "file is not valid UTF-8".to_string(),
    })?;
    parse_server_config(path, &contents)
}

/// Parse the contents of a server file. `path` is only used in errors.
pub fn parse_server_config(path: &Path, contents: &str) -> Result<ServerConfig> {
    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let document: Value = serde_json::from_str(contents).map_err(|e| ConfigError::ParseJson {
        path: path.to_path_buf(),
        message: sanitize(&e.to_string()),
    })?;

    let root = document
        .as_object()
        .ok_or_else(|| invalid("file does not contain a JSON object".to_string()))?;

    let (key_provider, server) = [Provider::DigitalOcean, Provider::Hetzner]
        .into_iter()
        .find_map(|p| root.get(p.config_key()).map(|v| (p, v)))
        .ok_or_else(|| ConfigError::UnknownProvider(path.to_path_buf()))?;

    let server = server
        .as_object()
        .ok_or_else(|| invalid(format!("'{}' is not an object", key_provider.config_key())))?;

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| server.get(**f).map_or(true, Value::is_null))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingFields {
            path: path.to_path_buf(),
            fields: missing,
        });
    }

    let provider = match server.get("provider").and_then(Value::as_str).map(str::trim) {
        Some(field) if !field.is_empty() => {
            let explicit: Provider = field.parse().map_err(invalid)?;
            if explicit != key_provider {
                warn!(
                    "Configuration file '{}': provider field '{}' doesn't match key type '{}'. Using '{}'.",
                    path.display(),
                    explicit,
                    key_provider,
                    explicit
                );
            }
            explicit
        }
        _ => key_provider,
    };

    let id = scalar_field(server.get("id"), "id").map_err(invalid)?;
    let name = scalar_field(server.get("name"), "name").map_err(invalid)?;
    let api_token = scalar_field(server.get("api_token"), "api_token").map_err(invalid)?;

    if id.is_empty() || name.is_empty() || api_token.is_empty() {
        return Err(invalid("id, name and api_token must not be empty".to_string()));
    }

    let retain_raw = scalar_field(server.get("retain_last_snapshots"), "retain_last_snapshots")
        .map_err(invalid)?;
    let retain_last_snapshots: u32 = retain_raw
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            invalid(format!(
                "retain_last_snapshots must be a non-negative integer, got '{}'",
                retain_raw
            ))
        })?;

    let telegram = optional_section::<TelegramOverrides>(server.get("telegram"), "telegram")
        .map_err(invalid)?
        .map(|mut t| {
            t.bot_token = real_value(t.bot_token);
            t.chat_id = real_value(t.chat_id);
            t
        });

    let webhook = optional_section::<WebhookOverrides>(server.get("webhook"), "webhook")
        .map_err(invalid)?
        .map(|mut w| {
            w.url = real_value(w.url);
            w
        });

    let config = ServerConfig {
        provider,
        id,
        name,
        api_token,
        retain_last_snapshots,
        telegram,
        webhook,
    };

    debug!("Loaded config: {:?}", config);
    Ok(config)
}

fn scalar_field(value: Option<&Value>, field: &str) -> std::result::Result<String, String> {
    let value = value.cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<Scalar>(value) {
        Ok(Scalar::Int(n)) => Ok(n.to_string()),
        Ok(Scalar::Text(s)) => Ok(s.trim().to_string()),
        Err(_) => Err(format!("field '{}' must be a string or an integer", field)),
    }
}

fn optional_section<T: serde::de::DeserializeOwned>(
    value: Option<&Value>,
    section: &str,
) -> std::result::Result<Option<T>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| format!("invalid '{}' section: {}", section, sanitize(&e.to_string()))),
    }
}

/// Drop empty and placeholder credentials
pub(crate) fn real_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !PLACEHOLDER_VALUES.contains(&v.to_lowercase().as_str()))
}

/// Find the server files to process.
///
/// With `requested` names, each is resolved against `configs_dir`;
/// otherwise every `*.json` file in the directory, sorted by name. macOS
/// resource-fork files (`._*`) are skipped silently; other non-JSON names
/// produce a [`ConfigError::NotJson`].
pub fn discover_server_files(
    configs_dir: &Path,
    requested: &[String],
) -> Result<(Vec<PathBuf>, Vec<ConfigError>)> {
    if !configs_dir.is_dir() {
        return Err(ConfigError::MissingDirectory(configs_dir.to_path_buf()));
    }

    let candidates: Vec<PathBuf> = if requested.is_empty() {
        let entries = fs::read_dir(configs_dir).map_err(|source| ConfigError::ReadError {
            path: configs_dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_json(p))
            .collect();
        files.sort();
        files
    } else {
        requested.iter().map(|name| configs_dir.join(name)).collect()
    };

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for path in candidates {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if file_name.starts_with("._") {
            debug!("Skipping macOS resource fork file: '{}'", path.display());
            continue;
        }
        if !is_json(&path) {
            errors.push(ConfigError::NotJson(path));
            continue;
        }
        files.push(path);
    }

    Ok((files, errors))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Load every file, collecting per-file errors instead of stopping
pub fn load_servers(files: &[PathBuf]) -> (Vec<ServerConfig>, Vec<ConfigError>) {
    let mut servers = Vec::new();
    let mut errors = Vec::new();

    for path in files {
        match load_server_config(path) {
            Ok(server) => servers.push(server),
            Err(e) => errors.push(e),
        }
    }

    (servers, errors)
}
