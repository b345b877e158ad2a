//! Notifications sent at the end of each server's pipeline

use serde_json::json;
use snapshot_manager::{ExitStatus, OperationStatus};
use std::time::Duration;
use test_utils::config_builder::{TEST_API_TOKEN, TEST_CHAT_ID};
use test_utils::fixtures::{do_fixtures, hetzner_fixtures, notifications_ok, telegram_route, webhook_bodies};
use test_utils::{
    GlobalBuilder, HttpResponse, Method, MockTransport, ServerBuilder, TelegramOverrides, TestHarness,
    WebhookOverrides,
};

const HOOK_HOST: &str = "hooks.example.com";
const HOOK_URL: &str = "https://hooks.example.com/snapshots";

fn telegram_texts(transport: &MockTransport) -> Vec<String> {
    transport
        .matching(Method::Post, &telegram_route())
        .into_iter()
        .filter_map(|r| r.body)
        .map(|b| b["text"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_failure_notifies_both_channels() {
    let server = ServerBuilder::digitalocean("web1").with_telegram().with_webhook(HOOK_URL).build();
    let transport = MockTransport::new().on(
        Method::Post,
        &do_fixtures::route("/droplets/42/actions"),
        do_fixtures::error(422, "unprocessable_entity", "Droplet already has a pending event."),
    );
    let harness = TestHarness::new(notifications_ok(transport, HOOK_HOST));

    harness.manage(&server);

    let bodies = webhook_bodies(&harness.transport, HOOK_HOST);
    assert_eq!(bodies.len(), 1);
    let payload = &bodies[0];
    assert_eq!(payload["status"], "FAILURE");
    assert_eq!(payload["server"], "web1");
    assert_eq!(payload["provider"], "digitalocean");
    assert_eq!(payload["snapshot_name"], "none");
    assert_eq!(payload["total_snapshots"], serde_json::Value::Null);
    assert!(payload["error"].as_str().unwrap().contains("pending event"));

    let texts = telegram_texts(&harness.transport);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("`FAILURE`"));
    assert!(texts[0].contains("*Error:*"));

    let message = &harness.transport.matching(Method::Post, &telegram_route())[0];
    let body = message.body.as_ref().unwrap();
    assert_eq!(body["chat_id"], TEST_CHAT_ID);
    assert_eq!(body["parse_mode"], "Markdown");
}

#[test]
fn test_success_payload_has_no_error_key() {
    let server = ServerBuilder::hetzner("app").with_webhook(HOOK_URL).build();
    let transport = hetzner_fixtures::happy_path(MockTransport::new(), &server, 4, 3);
    let harness = TestHarness::new(notifications_ok(transport, HOOK_HOST));

    harness.manage(&server);

    let payload = &webhook_bodies(&harness.transport, HOOK_HOST)[0];
    assert_eq!(payload["status"], "SUCCESS");
    assert_eq!(payload["total_snapshots"], 3);
    assert_eq!(payload["snapshot_info"], "3 snapshots exist");
    assert_eq!(payload["hostname"], "test-host");
    assert!(payload.get("error").is_none());
}

#[test]
fn test_custom_templates_per_status() {
    let server = ServerBuilder::digitalocean("web1")
        .telegram(TelegramOverrides {
            message_success: Some("✅ {server_name}: {snapshot_info}".to_string()),
            ..Default::default()
        })
        .webhook(WebhookOverrides {
            enabled: Some(true),
            url: Some(HOOK_URL.to_string()),
            payload_success: Some(json!({"text": "{droplet_name} ok", "count": "{total_snapshots}"})),
            ..Default::default()
        })
        .build();
    let transport = do_fixtures::happy_path(MockTransport::new(), &server, 3, 13);
    let global = GlobalBuilder::new().with_telegram().build();
    let harness = TestHarness::with_global(global, notifications_ok(transport, HOOK_HOST));

    harness.manage(&server);

    assert_eq!(telegram_texts(&harness.transport), vec!["✅ web1: 3 snapshots exist"]);
    assert_eq!(
        webhook_bodies(&harness.transport, HOOK_HOST),
        vec![json!({"text": "web1 ok", "count": "3"})]
    );
}

#[test]
fn test_telegram_outage_does_not_change_outcome() {
    let server = ServerBuilder::digitalocean("web1").with_telegram().with_webhook(HOOK_URL).build();
    let transport = do_fixtures::happy_path(MockTransport::new(), &server, 0, 13)
        .on(Method::Post, &telegram_route(), HttpResponse::new(502, "Bad Gateway"))
        .on(Method::Post, HOOK_HOST, HttpResponse::new(200, "ok"));
    let harness = TestHarness::new(transport);

    let summary = harness.run(&[server]);

    assert_eq!(summary.results[0].status, OperationStatus::Success);
    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert_eq!(harness.transport.count(Method::Post, &telegram_route()), 3);
    assert_eq!(harness.sleeper.durations(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
    // webhook still delivered after Telegram gave up
    assert_eq!(webhook_bodies(&harness.transport, HOOK_HOST).len(), 1);
}

#[test]
fn test_notification_retry_settings_from_server() {
    let server = ServerBuilder::digitalocean("web1")
        .webhook(WebhookOverrides {
            enabled: Some(true),
            url: Some(HOOK_URL.to_string()),
            retries: Some(1),
            ..Default::default()
        })
        .build();
    let transport = do_fixtures::happy_path(MockTransport::new(), &server, 0, 13)
        .on(Method::Post, HOOK_HOST, HttpResponse::new(503, "unavailable"));
    let harness = TestHarness::new(transport);

    harness.manage(&server);

    assert_eq!(harness.transport.count(Method::Post, HOOK_HOST), 1);
    assert!(harness.sleeper.durations().is_empty());
}

#[test]
fn test_notifications_never_contain_api_token() {
    let server = ServerBuilder::digitalocean("web1").with_telegram().with_webhook(HOOK_URL).build();
    let transport = MockTransport::new().on(
        Method::Post,
        &do_fixtures::route("/droplets/42/actions"),
        do_fixtures::error(401, "unauthorized", &format!("token {} is invalid", TEST_API_TOKEN)),
    );
    let harness = TestHarness::new(notifications_ok(transport, HOOK_HOST));

    let result = harness.manage(&server);

    assert!(!result.error_detail.unwrap().contains(TEST_API_TOKEN));
    for text in telegram_texts(&harness.transport) {
        assert!(!text.contains(TEST_API_TOKEN));
    }
    for body in webhook_bodies(&harness.transport, HOOK_HOST) {
        assert!(!body.to_string().contains(TEST_API_TOKEN));
    }
}

#[test]
fn test_channels_skipped_without_credentials() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = do_fixtures::happy_path(MockTransport::new(), &server, 0, 13);
    let harness = TestHarness::new(notifications_ok(transport, HOOK_HOST));

    harness.manage(&server);

    assert_eq!(harness.transport.count(Method::Post, "api.telegram.org"), 0);
    assert_eq!(harness.transport.count(Method::Post, HOOK_HOST), 0);
}
