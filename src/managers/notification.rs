//! Telegram and webhook notification dispatcher
//!
//! Each channel resolves its own settings through the 3-tier cascade and
//! is sent independently; a failure on one never blocks the other, and no
//! delivery problem ever changes the run's exit status.

use crate::api::{ApiClient, HttpTransport, Method, Sleeper};
use crate::config::{resolve_telegram, resolve_webhook, EffectiveTelegram, EffectiveWebhook, GlobalConfig, ServerConfig};
use crate::error::NotificationError;
use crate::managers::snapshot::{OperationResult, OperationStatus};
use crate::utils::sanitize::{mask_secrets, sanitize_with};
use crate::utils::template::{map_strings, render, render_json, TemplateVars};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Channel disabled or missing a credential; carries the reason
    Skipped(&'static str),
    /// Delivery failed after retries; carries the sanitised error
    Failed(String),
}

/// Per-channel outcomes for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub telegram: DeliveryOutcome,
    pub webhook: DeliveryOutcome,
}

#[derive(Deserialize)]
struct TelegramErrorBody {
    description: String,
}

fn decode_telegram_error(body: &str) -> Option<String> {
    serde_json::from_str::<TelegramErrorBody>(body)
        .ok()
        .map(|e| e.description)
}

/// Notification manager for Telegram and generic webhooks
pub struct NotificationManager {
    global: GlobalConfig,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
}

impl NotificationManager {
    /// Create a new notification manager with `global` as the fallback tier
    pub fn new(global: &GlobalConfig, transport: Arc<dyn HttpTransport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            global: global.clone(),
            transport,
            sleeper,
        }
    }

    /// Active channels for `server`, e.g. `Telegram, Webhook` or `None`
    pub fn channel_summary(&self, server: &ServerConfig) -> String {
        let mut channels = Vec::new();
        if resolve_telegram(server, &self.global).is_active() {
            channels.push("Telegram");
        }
        if resolve_webhook(server, &self.global).is_active() {
            channels.push("Webhook");
        }
        if channels.is_empty() {
            "None".to_string()
        } else {
            channels.join(", ")
        }
    }

    /// Send `result` on every enabled channel. Never fails.
    pub fn notify(&self, server: &ServerConfig, result: &OperationResult) -> NotifyReport {
        let telegram = resolve_telegram(server, &self.global);
        let webhook = resolve_webhook(server, &self.global);

        NotifyReport {
            telegram: self.send_telegram(server, result, &telegram),
            webhook: self.send_webhook(server, result, &webhook),
        }
    }

    fn send_telegram(
        &self,
        server: &ServerConfig,
        result: &OperationResult,
        settings: &EffectiveTelegram,
    ) -> DeliveryOutcome {
        if !settings.enabled {
            debug!("[TELEGRAM] Disabled for {}, skipping", server.name);
            return DeliveryOutcome::Skipped("disabled");
        }
        let (Some(token), Some(chat_id)) = (settings.bot_token.as_deref(), settings.chat_id.as_deref()) else {
            let missing = settings.missing_credential().unwrap_or("credentials");
            debug!("[TELEGRAM] No {} configured for {}, skipping", missing, server.name);
            return DeliveryOutcome::Skipped(missing);
        };

        let secrets = [server.api_token.as_str(), token];
        let text = render_telegram_message(settings, result, &secrets);

        match self.deliver_telegram(settings, token, chat_id, &text, &server.api_token) {
            Ok(()) => {
                info!("[TELEGRAM] Notification sent for {} ({})", server.name, result.status);
                DeliveryOutcome::Sent
            }
            Err(e) => {
                let message = sanitize_with(&e.to_string(), &secrets);
                warn!("[TELEGRAM] Failed to send notification for {}: {}", server.name, message);
                DeliveryOutcome::Failed(message)
            }
        }
    }

    fn deliver_telegram(
        &self,
        settings: &EffectiveTelegram,
        token: &str,
        chat_id: &str,
        text: &str,
        api_token: &str,
    ) -> Result<(), NotificationError> {
        let client = ApiClient::new("telegram", &settings.api_base, self.transport.clone(), self.sleeper.clone())
            .with_secret(token)
            .with_secret(api_token)
            .with_retry_policy(settings.delivery.policy)
            .with_timeout(settings.delivery.timeout)
            .with_error_decoder(decode_telegram_error);

        client
            .post_json(
                &format!("/bot{}/sendMessage", token),
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                }),
            )
            .map(|_| ())
            .map_err(|source| NotificationError::Delivery {
                channel: "telegram",
                source,
            })
    }

    fn send_webhook(
        &self,
        server: &ServerConfig,
        result: &OperationResult,
        settings: &EffectiveWebhook,
    ) -> DeliveryOutcome {
        if !settings.enabled {
            debug!("[WEBHOOK] Disabled for {}, skipping", server.name);
            return DeliveryOutcome::Skipped("disabled");
        }
        let Some(url) = settings.url.as_deref() else {
            debug!("[WEBHOOK] No url configured for {}, skipping", server.name);
            return DeliveryOutcome::Skipped("url");
        };

        let secrets = [server.api_token.as_str(), url];
        let payload = build_webhook_payload(settings, result, &secrets);
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "webhook".to_string());

        let client = ApiClient::new("webhook", url, self.transport.clone(), self.sleeper.clone())
            .with_secret(url)
            .with_secret(server.api_token.as_str())
            .with_retry_policy(settings.delivery.policy)
            .with_timeout(settings.delivery.timeout);

        match client
            .request(Method::Post, url, &[], Some(payload))
            .map_err(|source| NotificationError::Delivery {
                channel: "webhook",
                source,
            }) {
            Ok(response) => {
                info!(
                    "[WEBHOOK] Notification sent to {} for {} (status {})",
                    host, server.name, response.status
                );
                DeliveryOutcome::Sent
            }
            Err(e) => {
                let message = sanitize_with(&e.to_string(), &secrets);
                warn!("[WEBHOOK] Failed to notify {} for {}: {}", host, server.name, message);
                DeliveryOutcome::Failed(message)
            }
        }
    }
}

/// Standardised notification object shared by both channels
pub fn standard_payload(result: &OperationResult) -> Value {
    let mut payload = json!({
        "script": result.script_name,
        "provider": result.provider.as_str(),
        "server": result.server_name,
        "server_id": result.server_id,
        "status": result.status.as_str(),
        "hostname": result.hostname,
        "timestamp": result.timestamp,
        "snapshot_name": result.snapshot_label(),
        "total_snapshots": result.total_snapshots,
        "snapshot_info": result.snapshot_info(),
    });

    if result.status == OperationStatus::Failure {
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "error".to_string(),
                Value::String(result.error_detail.clone().unwrap_or_default()),
            );
        }
    }
    payload
}

/// Built-in Markdown message
pub fn default_telegram_message(result: &OperationResult) -> String {
    let mut message = format!(
        "*FINAL_STATUS*\n\
         *Script:* `{}`\n\
         *Provider:* `{}`\n\
         *Server:* `{}`\n\
         *Status:* `{}`\n\
         *Hostname:* `{}`\n\
         *Timestamp:* `{}`\n\
         *Snapshot:* `{}`\n\
         *Total Snapshots:* `{}`",
        result.script_name,
        result.provider.as_str().to_uppercase(),
        result.server_name,
        result.status,
        result.hostname,
        result.timestamp,
        result.snapshot_label(),
        result.snapshot_info()
    );

    if let Some(ref detail) = result.error_detail {
        // backticks would end the code span early
        message.push_str(&format!("\n*Error:* `{}`", detail.replace('`', "'")));
    }
    message
}

/// Custom template for the result's status, or the built-in message.
///
/// Interpolated values are fully sanitised. Literal template text only has
/// `secrets` masked, so user-written keys and ids survive.
pub fn render_telegram_message(settings: &EffectiveTelegram, result: &OperationResult, secrets: &[&str]) -> String {
    match settings.template_for(result.status) {
        Some(template) => mask_secrets(&render(template, &sanitized_vars(result, secrets)), secrets),
        None => sanitize_with(&default_telegram_message(result), secrets),
    }
}

/// Custom payload for the result's status, or the standardised object.
/// Sanitised the same way as [`render_telegram_message`].
pub fn build_webhook_payload(settings: &EffectiveWebhook, result: &OperationResult, secrets: &[&str]) -> Value {
    match settings.payload_for(result.status) {
        Some(template) => map_strings(
            &render_json(template, &sanitized_vars(result, secrets)),
            &|s| mask_secrets(s, secrets),
        ),
        None => map_strings(&standard_payload(result), &|s| sanitize_with(s, secrets)),
    }
}

fn sanitized_vars(result: &OperationResult, secrets: &[&str]) -> TemplateVars {
    result.template_vars().map_values(|v| sanitize_with(v, secrets))
}
