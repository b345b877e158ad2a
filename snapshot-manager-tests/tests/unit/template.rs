//! Notification templates rendered from a server's operation result

use serde_json::json;
use snapshot_manager::utils::template::{render, render_json};
use snapshot_manager::{OperationResult, OperationStatus, Provider};
use test_utils::Stage;

fn result(status: OperationStatus) -> OperationResult {
    OperationResult {
        server_name: "web1".to_string(),
        server_id: "3164444".to_string(),
        provider: Provider::DigitalOcean,
        status,
        stage: Stage::Done,
        snapshot_name: Some("web1-20240101030000".to_string()),
        total_snapshots: Some(3),
        deleted: 2,
        delete_failures: 0,
        timestamp: "2024-01-01 03:00:00".to_string(),
        hostname: "backup-host".to_string(),
        script_name: "snapshot-manager".to_string(),
        error_detail: None,
    }
}

#[test]
fn test_render_all_result_fields() {
    let vars = result(OperationStatus::Success).template_vars();

    let text = render(
        "{script} {provider} {server_name}/{server_id} {status} on {hostname} at {timestamp}: {snapshot_name} ({total_snapshots}, {snapshot_info})",
        &vars,
    );

    assert_eq!(
        text,
        "snapshot-manager digitalocean web1/3164444 SUCCESS on backup-host at 2024-01-01 03:00:00: \
         web1-20240101030000 (3, 3 snapshots exist)"
    );
}

#[test]
fn test_legacy_droplet_placeholders() {
    let vars = result(OperationStatus::Success).template_vars();
    assert_eq!(render("{droplet_name} ({droplet_id})", &vars), "web1 (3164444)");
}

#[test]
fn test_failure_without_snapshot() {
    let mut failed = result(OperationStatus::Failure);
    failed.snapshot_name = None;
    failed.total_snapshots = None;
    failed.error_detail = Some("creation failed: quota exceeded".to_string());

    let text = render("{status}: {snapshot_name} / {total_snapshots} / {error_detail}", &failed.template_vars());

    assert_eq!(text, "FAILURE: none / unknown / creation failed: quota exceeded");
}

#[test]
fn test_unknown_placeholders_and_values_with_braces() {
    let mut odd = result(OperationStatus::Success);
    odd.server_name = "{status}".to_string();

    let text = render("{server_name} {unknown}", &odd.template_vars());

    // substituted values are not expanded again
    assert_eq!(text, "{status} {unknown}");
}

#[test]
fn test_payload_renders_nested_string_leaves() {
    let payload = json!({
        "text": "{server_name} is {status}",
        "fields": [{"title": "Snapshot", "value": "{snapshot_name}"}],
        "count": 3,
        "urgent": false
    });

    let rendered = render_json(&payload, &result(OperationStatus::Success).template_vars());

    assert_eq!(
        rendered,
        json!({
            "text": "web1 is SUCCESS",
            "fields": [{"title": "Snapshot", "value": "web1-20240101030000"}],
            "count": 3,
            "urgent": false
        })
    );
}
