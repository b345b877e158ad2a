//! Fluent API for building test configurations
//!
//! Provides builders for server entries and global settings with sensible
//! defaults for mocked runs (no delays, short polls).

use serde_json::{json, Map, Value};
use snapshot_manager::config::{
    GlobalConfig, ServerConfig, TelegramDefaults, TelegramOverrides, WebhookDefaults, WebhookOverrides,
};
use snapshot_manager::providers::Provider;

/// Token long enough to be caught by the long-token sanitiser
pub const TEST_API_TOKEN: &str = "dop_v1_0123456789abcdef0123456789abcdef";
pub const TEST_BOT_TOKEN: &str = "123456789:AAHtestBotTokenValue_abcdefghijkl";
pub const TEST_CHAT_ID: &str = "-1001234567890";

/// Builder for one server entry
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    fn new(provider: Provider, name: &str) -> Self {
        Self {
            config: ServerConfig {
                provider,
                id: "42".to_string(),
                name: name.to_string(),
                api_token: TEST_API_TOKEN.to_string(),
                retain_last_snapshots: 3,
                telegram: None,
                webhook: None,
            },
        }
    }

    /// DigitalOcean droplet with id 42, retaining 3
    pub fn digitalocean(name: &str) -> Self {
        Self::new(Provider::DigitalOcean, name)
    }

    /// Hetzner Cloud server with id 42, retaining 3
    pub fn hetzner(name: &str) -> Self {
        Self::new(Provider::Hetzner, name)
    }

    pub fn id(mut self, id: &str) -> Self {
        self.config.id = id.to_string();
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.config.api_token = token.to_string();
        self
    }

    pub fn retain(mut self, count: u32) -> Self {
        self.config.retain_last_snapshots = count;
        self
    }

    pub fn telegram(mut self, telegram: TelegramOverrides) -> Self {
        self.config.telegram = Some(telegram);
        self
    }

    /// Telegram enabled with the test bot token and chat id
    pub fn with_telegram(self) -> Self {
        self.telegram(TelegramOverrides {
            enabled: Some(true),
            bot_token: Some(TEST_BOT_TOKEN.to_string()),
            chat_id: Some(TEST_CHAT_ID.to_string()),
            ..Default::default()
        })
    }

    pub fn webhook(mut self, webhook: WebhookOverrides) -> Self {
        self.config.webhook = Some(webhook);
        self
    }

    /// Webhook enabled and pointed at `url`
    pub fn with_webhook(self, url: &str) -> Self {
        self.webhook(WebhookOverrides {
            enabled: Some(true),
            url: Some(url.to_string()),
            ..Default::default()
        })
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }

    /// The server file document, keyed by the provider's config key
    pub fn to_json(&self) -> Value {
        let c = &self.config;
        let mut server = Map::new();
        server.insert("id".to_string(), json!(c.id));
        server.insert("name".to_string(), json!(c.name));
        server.insert("api_token".to_string(), json!(c.api_token));
        server.insert("retain_last_snapshots".to_string(), json!(c.retain_last_snapshots));
        if let Some(ref telegram) = c.telegram {
            server.insert("telegram".to_string(), serde_json::to_value(telegram).unwrap());
        }
        if let Some(ref webhook) = c.webhook {
            server.insert("webhook".to_string(), serde_json::to_value(webhook).unwrap());
        }

        let mut root = Map::new();
        root.insert(c.provider.config_key().to_string(), Value::Object(server));
        Value::Object(root)
    }
}

/// Builder for global settings
#[derive(Debug, Clone)]
pub struct GlobalBuilder {
    config: GlobalConfig,
}

impl Default for GlobalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalBuilder {
    /// Defaults with no delay between servers and a 5s poll interval
    pub fn new() -> Self {
        let mut config = GlobalConfig::default();
        config.timing.delay_between_servers = 0;
        Self { config }
    }

    pub fn delay_between_servers(mut self, secs: u64) -> Self {
        self.config.timing.delay_between_servers = secs;
        self
    }

    pub fn poll(mut self, interval_secs: u64, timeout_secs: u64) -> Self {
        self.config.timing.poll_interval = interval_secs;
        self.config.timing.snapshot_creation_timeout = timeout_secs;
        self
    }

    pub fn api_retries(mut self, retries: u32, base_delay_secs: u64) -> Self {
        self.config.api.retries = retries;
        self.config.api.base_delay_between_retries = base_delay_secs;
        self
    }

    pub fn telegram(mut self, telegram: TelegramDefaults) -> Self {
        self.config.telegram = telegram;
        self
    }

    /// Global Telegram credentials, enabled
    pub fn with_telegram(self) -> Self {
        self.telegram(TelegramDefaults {
            enabled: Some(true),
            bot_token: Some(TEST_BOT_TOKEN.to_string()),
            chat_id: Some(TEST_CHAT_ID.to_string()),
            ..Default::default()
        })
    }

    /// Telegram explicitly disabled at the global tier
    pub fn without_telegram(self) -> Self {
        self.telegram(TelegramDefaults {
            enabled: Some(false),
            ..Default::default()
        })
    }

    pub fn webhook(mut self, webhook: WebhookDefaults) -> Self {
        self.config.webhook = webhook;
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
