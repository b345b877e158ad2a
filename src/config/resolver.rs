//! Three-tier resolution of notification settings
//!
//! Every settable property resolves independently as:
//! per-server value, then global fallback, then built-in default.
//! Resolution is a pure function of the two configs.

use super::loader::real_value;
use super::types::{GlobalConfig, ServerConfig};
use crate::api::RetryPolicy;
use crate::managers::snapshot::OperationStatus;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TELEGRAM_ENABLED: bool = true;
pub const DEFAULT_WEBHOOK_ENABLED: bool = false;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_NOTIFY_RETRIES: u32 = 3;
pub const DEFAULT_NOTIFY_BASE_DELAY_SECS: u64 = 2;
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Whether a configured value counts as set
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for u32 {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for u64 {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for Value {
    fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

/// First present value among the per-server and global tiers
pub fn first_present<T: Presence + Clone>(server: Option<&T>, global: Option<&T>) -> Option<T> {
    server
        .filter(|v| v.is_present())
        .or_else(|| global.filter(|v| v.is_present()))
        .cloned()
}

/// Per-server, then global, then `default`
pub fn cascade<T: Presence + Clone>(server: Option<&T>, global: Option<&T>, default: T) -> T {
    first_present(server, global).unwrap_or(default)
}

/// Timeout and retry schedule for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    pub timeout: Duration,
    pub policy: RetryPolicy,
}

impl DeliverySettings {
    fn resolve(
        timeout: (Option<&u64>, Option<&u64>),
        retries: (Option<&u32>, Option<&u32>),
        base_delay: (Option<&u64>, Option<&u64>),
    ) -> Self {
        let timeout = cascade(timeout.0, timeout.1, DEFAULT_NOTIFY_TIMEOUT_SECS);
        let retries = cascade(retries.0, retries.1, DEFAULT_NOTIFY_RETRIES);
        let base_delay = cascade(base_delay.0, base_delay.1, DEFAULT_NOTIFY_BASE_DELAY_SECS);
        Self {
            timeout: Duration::from_secs(timeout),
            policy: RetryPolicy::new(retries, Duration::from_secs(base_delay)),
        }
    }
}

/// Resolved Telegram settings for one server
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveTelegram {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub delivery: DeliverySettings,
    pub message_success: Option<String>,
    pub message_failure: Option<String>,
    pub api_base: String,
}

impl EffectiveTelegram {
    /// Custom template for `status`, if one is configured
    pub fn template_for(&self, status: OperationStatus) -> Option<&str> {
        match status {
            OperationStatus::Success => self.message_success.as_deref(),
            OperationStatus::Failure => self.message_failure.as_deref(),
        }
    }

    /// Name of the first missing credential
    pub fn missing_credential(&self) -> Option<&'static str> {
        if self.bot_token.is_none() {
            Some("bot_token")
        } else if self.chat_id.is_none() {
            Some("chat_id")
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.missing_credential().is_none()
    }
}

/// Resolved webhook settings for one server
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveWebhook {
    pub enabled: bool,
    pub url: Option<String>,
    pub delivery: DeliverySettings,
    pub payload_success: Option<Value>,
    pub payload_failure: Option<Value>,
}

impl EffectiveWebhook {
    /// Custom payload for `status`, if one is configured
    pub fn payload_for(&self, status: OperationStatus) -> Option<&Value> {
        match status {
            OperationStatus::Success => self.payload_success.as_ref(),
            OperationStatus::Failure => self.payload_failure.as_ref(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.url.is_some()
    }
}

pub fn resolve_telegram(server: &ServerConfig, global: &GlobalConfig) -> EffectiveTelegram {
    let local = server.telegram.as_ref();
    let fallback = &global.telegram;

    let global_token = real_value(fallback.bot_token.clone());
    let global_chat = real_value(fallback.chat_id.clone());

    EffectiveTelegram {
        enabled: cascade(
            local.and_then(|t| t.enabled.as_ref()),
            fallback.enabled.as_ref(),
            DEFAULT_TELEGRAM_ENABLED,
        ),
        bot_token: first_present(local.and_then(|t| t.bot_token.as_ref()), global_token.as_ref()),
        chat_id: first_present(local.and_then(|t| t.chat_id.as_ref()), global_chat.as_ref()),
        delivery: DeliverySettings::resolve(
            (local.and_then(|t| t.timeout.as_ref()), fallback.timeout.as_ref()),
            (local.and_then(|t| t.retries.as_ref()), fallback.retries.as_ref()),
            (
                local.and_then(|t| t.base_delay_between_retries.as_ref()),
                fallback.base_delay_between_retries.as_ref(),
            ),
        ),
        message_success: first_present(
            local.and_then(|t| t.message_success.as_ref()),
            fallback.message_success.as_ref(),
        ),
        message_failure: first_present(
            local.and_then(|t| t.message_failure.as_ref()),
            fallback.message_failure.as_ref(),
        ),
        api_base: cascade(
            None,
            fallback.api_base.as_ref(),
            DEFAULT_TELEGRAM_API_BASE.to_string(),
        )
        .trim_end_matches('/')
        .to_string(),
    }
}

pub fn resolve_webhook(server: &ServerConfig, global: &GlobalConfig) -> EffectiveWebhook {
    let local = server.webhook.as_ref();
    let fallback = &global.webhook;

    let global_url = real_value(fallback.url.clone());

    let local_success = local.and_then(|w| payload_object(w.payload_success.as_ref(), "payload_success"));
    let local_failure = local.and_then(|w| payload_object(w.payload_failure.as_ref(), "payload_failure"));
    let global_success = payload_object(fallback.payload_success.as_ref(), "payload_success");
    let global_failure = payload_object(fallback.payload_failure.as_ref(), "payload_failure");

    EffectiveWebhook {
        enabled: cascade(
            local.and_then(|w| w.enabled.as_ref()),
            fallback.enabled.as_ref(),
            DEFAULT_WEBHOOK_ENABLED,
        ),
        url: first_present(local.and_then(|w| w.url.as_ref()), global_url.as_ref()),
        delivery: DeliverySettings::resolve(
            (local.and_then(|w| w.timeout.as_ref()), fallback.timeout.as_ref()),
            (local.and_then(|w| w.retries.as_ref()), fallback.retries.as_ref()),
            (
                local.and_then(|w| w.base_delay_between_retries.as_ref()),
                fallback.base_delay_between_retries.as_ref(),
            ),
        ),
        payload_success: first_present(local_success.as_ref(), global_success.as_ref()),
        payload_failure: first_present(local_failure.as_ref(), global_failure.as_ref()),
    }
}

/// Normalise a configured payload to a JSON object. Strings are parsed as
/// JSON; anything that is not an object is ignored with a warning.
fn payload_object(value: Option<&Value>, field: &str) -> Option<Value> {
    let value = value.filter(|v| v.is_present())?;
    let parsed = match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring webhook {}: invalid JSON ({})", field, e);
                return None;
            }
        },
        other => other.clone(),
    };

    if parsed.is_object() {
        Some(parsed)
    } else {
        warn!("Ignoring webhook {}: expected a JSON object", field);
        None
    }
}
