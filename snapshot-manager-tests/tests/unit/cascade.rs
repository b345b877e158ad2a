//! Per-property notification settings cascade: server, then global, then default

use serde_json::json;
use snapshot_manager::config::{
    resolve_telegram, resolve_webhook, TelegramDefaults, TelegramOverrides, WebhookDefaults, WebhookOverrides,
};
use snapshot_manager::OperationStatus;
use std::time::Duration;
use test_utils::{GlobalBuilder, ServerBuilder};

#[test]
fn test_bot_token_from_global_chat_id_from_server() {
    let global = GlobalBuilder::new()
        .telegram(TelegramDefaults {
            bot_token: Some("111:global-token".to_string()),
            chat_id: Some("-100".to_string()),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::digitalocean("web1")
        .telegram(TelegramOverrides {
            chat_id: Some("-200".to_string()),
            ..Default::default()
        })
        .build();

    let effective = resolve_telegram(&server, &global);

    assert_eq!(effective.bot_token.as_deref(), Some("111:global-token"));
    assert_eq!(effective.chat_id.as_deref(), Some("-200"));
    assert!(effective.is_active());
}

#[test]
fn test_blank_server_value_falls_through() {
    let global = GlobalBuilder::new()
        .telegram(TelegramDefaults {
            bot_token: Some("111:global-token".to_string()),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::hetzner("app")
        .telegram(TelegramOverrides {
            bot_token: Some("   ".to_string()),
            ..Default::default()
        })
        .build();

    let effective = resolve_telegram(&server, &global);

    assert_eq!(effective.bot_token.as_deref(), Some("111:global-token"));
    assert_eq!(effective.missing_credential(), Some("chat_id"));
    assert!(!effective.is_active());
}

#[test]
fn test_telegram_defaults_when_nothing_configured() {
    let global = GlobalBuilder::new().build();
    let server = ServerBuilder::digitalocean("web1").build();

    let effective = resolve_telegram(&server, &global);

    assert!(effective.enabled);
    assert_eq!(effective.missing_credential(), Some("bot_token"));
    assert_eq!(effective.delivery.timeout, Duration::from_secs(10));
    assert_eq!(effective.delivery.policy.retries, 3);
    assert_eq!(effective.api_base, "https://api.telegram.org");
}

#[test]
fn test_server_can_disable_globally_enabled_telegram() {
    let global = GlobalBuilder::new().with_telegram().build();
    let server = ServerBuilder::digitalocean("web1")
        .telegram(TelegramOverrides {
            enabled: Some(false),
            ..Default::default()
        })
        .build();

    let effective = resolve_telegram(&server, &global);

    assert!(!effective.enabled);
    // credentials still resolve even though the channel is off
    assert!(effective.bot_token.is_some());
}

#[test]
fn test_message_templates_resolve_independently() {
    let global = GlobalBuilder::new()
        .telegram(TelegramDefaults {
            message_success: Some("global ok {server_name}".to_string()),
            message_failure: Some("global fail {server_name}".to_string()),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::digitalocean("web1")
        .telegram(TelegramOverrides {
            message_success: Some("server ok {server_name}".to_string()),
            ..Default::default()
        })
        .build();

    let effective = resolve_telegram(&server, &global);

    assert_eq!(effective.template_for(OperationStatus::Success), Some("server ok {server_name}"));
    assert_eq!(effective.template_for(OperationStatus::Failure), Some("global fail {server_name}"));
}

#[test]
fn test_global_placeholder_credentials_are_ignored() {
    let global = GlobalBuilder::new()
        .telegram(TelegramDefaults {
            bot_token: Some("your_telegram_bot_token_here".to_string()),
            chat_id: Some("your_telegram_chat_id_here".to_string()),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::digitalocean("web1").build();

    let effective = resolve_telegram(&server, &global);

    assert!(effective.bot_token.is_none());
    assert!(effective.chat_id.is_none());
}

#[test]
fn test_webhook_disabled_by_default() {
    let global = GlobalBuilder::new()
        .webhook(WebhookDefaults {
            url: Some("https://hooks.example.com/snap".to_string()),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::digitalocean("web1").build();

    let effective = resolve_webhook(&server, &global);

    assert!(!effective.enabled);
    assert_eq!(effective.url.as_deref(), Some("https://hooks.example.com/snap"));
    assert!(!effective.is_active());
}

#[test]
fn test_webhook_url_and_payloads_cascade() {
    let global = GlobalBuilder::new()
        .webhook(WebhookDefaults {
            enabled: Some(true),
            url: Some("https://global.example.com/hook".to_string()),
            payload_failure: Some(json!({"text": "global failure {server_name}"})),
            retries: Some(5),
            ..Default::default()
        })
        .build();
    let server = ServerBuilder::hetzner("app")
        .webhook(WebhookOverrides {
            url: Some("https://server.example.com/hook".to_string()),
            payload_success: Some(json!("{\"text\": \"server success {server_name}\"}")),
            timeout: Some(3),
            ..Default::default()
        })
        .build();

    let effective = resolve_webhook(&server, &global);

    assert!(effective.is_active());
    assert_eq!(effective.url.as_deref(), Some("https://server.example.com/hook"));
    assert_eq!(
        effective.payload_for(OperationStatus::Success),
        Some(&json!({"text": "server success {server_name}"}))
    );
    assert_eq!(
        effective.payload_for(OperationStatus::Failure),
        Some(&json!({"text": "global failure {server_name}"}))
    );
    assert_eq!(effective.delivery.timeout, Duration::from_secs(3));
    assert_eq!(effective.delivery.policy.retries, 5);
}

#[test]
fn test_invalid_payload_string_is_ignored() {
    let global = GlobalBuilder::new().build();
    let server = ServerBuilder::digitalocean("web1")
        .webhook(WebhookOverrides {
            enabled: Some(true),
            url: Some("https://hooks.example.com".to_string()),
            payload_success: Some(json!("not json {")),
            payload_failure: Some(json!(["an", "array"])),
            ..Default::default()
        })
        .build();

    let effective = resolve_webhook(&server, &global);

    assert!(effective.payload_for(OperationStatus::Success).is_none());
    assert!(effective.payload_for(OperationStatus::Failure).is_none());
}
