//! Configuration for snapshot-manager
//!
//! Global settings come from a TOML file; each server has its own JSON
//! file in the configs directory.
//!
//! ## Notification settings
//!
//! Telegram and webhook properties resolve independently, in this order:
//! 1. Per-server JSON value
//! 2. Global fallback from the settings file
//! 3. Built-in default
//!
//! ## Example Usage
//!
//! ```no_run
//! use snapshot_manager::config;
//!
//! let global = config::load_global_config("snapshots.toml")?;
//! let paths = global.paths(std::path::Path::new("."));
//! let (files, _skipped) = config::discover_server_files(&paths.configs_dir, &[])?;
//! let (servers, errors) = config::load_servers(&files);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
pub mod resolver;
mod types;

pub use loader::{
    discover_server_files, load_global_config, load_server_config, load_servers, parse_server_config,
    ConfigError, Result,
};
pub use resolver::{resolve_telegram, resolve_webhook, DeliverySettings, EffectiveTelegram, EffectiveWebhook};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
