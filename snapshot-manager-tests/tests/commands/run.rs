//! Tests for a snapshot run: create, confirm, list and prune

use snapshot_manager::{ExitStatus, OperationStatus};
use std::time::Duration;
use test_utils::fixtures::{do_fixtures, hetzner_fixtures, notifications_ok, telegram_route};
use test_utils::{GlobalBuilder, HttpResponse, Method, MockTransport, ResultAssertions, ServerBuilder, Stage, TestHarness};

#[test]
fn test_digitalocean_run_prunes_oldest() {
    let server = ServerBuilder::digitalocean("web1").retain(3).with_telegram().build();
    let transport = notifications_ok(
        do_fixtures::happy_path(MockTransport::new(), &server, 5, 13),
        "hooks.example.com",
    );
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(result.stage, Stage::Done);
    assert_eq!(result.total_snapshots, Some(3));
    assert_eq!(result.deleted, 3);
    assert!(result.snapshot_label().starts_with("web1-"));

    let t = &harness.transport;
    let deletes: Vec<String> = t.matching(Method::Delete, "/snapshots/").into_iter().map(|r| r.url).collect();
    assert_eq!(deletes.len(), 3);
    for id in ["1000", "1001", "1002"] {
        assert!(deletes.iter().any(|u| u.ends_with(&format!("/snapshots/{}", id))), "{} not deleted", id);
    }

    let create = &t.matching(Method::Post, "/droplets/42/actions")[0];
    let body = create.body.as_ref().unwrap();
    assert_eq!(body["type"], "snapshot");
    assert_eq!(body["name"], result.snapshot_label());

    let messages = t.matching(Method::Post, &telegram_route());
    assert_eq!(messages.len(), 1);
    let text = messages[0].body.as_ref().unwrap()["text"].as_str().unwrap().to_string();
    assert!(text.contains("`SUCCESS`"));
    assert!(text.contains("3 snapshots exist"));

    assert!(harness.sleeper.durations().is_empty());
}

#[test]
fn test_provider_requests_carry_bearer_token() {
    let server = ServerBuilder::digitalocean("web1").build();
    let harness = TestHarness::new(do_fixtures::happy_path(MockTransport::new(), &server, 0, 13));

    harness.manage(&server).assert_success();

    for request in harness.transport.requests() {
        let auth = request
            .headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .map(|(_, v)| v.clone());
        assert_eq!(auth, Some(format!("Bearer {}", server.api_token)));
    }
}

#[test]
fn test_hetzner_run_prunes_oldest() {
    let server = ServerBuilder::hetzner("app").retain(2).build();
    let harness = TestHarness::new(hetzner_fixtures::happy_path(MockTransport::new(), &server, 3, 77));

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(result.total_snapshots, Some(2));

    let t = &harness.transport;
    assert_eq!(t.count(Method::Delete, "/images/2000"), 1);
    assert_eq!(t.count(Method::Delete, "/images/2001"), 1);
    assert_eq!(t.count(Method::Delete, "/images/"), 2);

    let create = &t.matching(Method::Post, "/servers/42/actions/create_image")[0];
    assert_eq!(create.body.as_ref().unwrap()["description"], result.snapshot_label());
    assert!(t.requests().iter().any(|r| r.url.contains("type=snapshot")));
}

#[test]
fn test_retain_zero_deletes_everything_including_new() {
    let server = ServerBuilder::hetzner("app").retain(0).build();
    let harness = TestHarness::new(hetzner_fixtures::happy_path(MockTransport::new(), &server, 2, 5));

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(result.total_snapshots, Some(0));
    assert_eq!(harness.transport.count(Method::Delete, "/images/"), 3);
}

#[test]
fn test_listing_failure_after_creation_is_success_with_unknown_total() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = MockTransport::new()
        .on(Method::Post, &do_fixtures::route("/droplets/42/actions"), do_fixtures::created(13))
        .on(Method::Get, &do_fixtures::route("/actions/13"), do_fixtures::action(13, "completed"))
        .on(
            Method::Get,
            &do_fixtures::route("/snapshots"),
            do_fixtures::error(403, "forbidden", "You do not have access for the attempted action."),
        );
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(result.total_snapshots, None);
    assert_eq!(result.total_label(), "unknown");
    assert!(result.error_detail.as_deref().unwrap().contains("forbidden"));
    assert_eq!(harness.transport.count(Method::Delete, "/snapshots/"), 0);
}

#[test]
fn test_creation_rejected_stops_pipeline() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = MockTransport::new().on(
        Method::Post,
        &do_fixtures::route("/droplets/42/actions"),
        do_fixtures::error(422, "unprocessable_entity", "Droplet already has a pending event."),
    );
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_failed_at(Stage::Creating);
    assert_eq!(result.snapshot_name, None);
    assert!(result.error_detail.as_deref().unwrap().contains("pending event"));

    let t = &harness.transport;
    assert_eq!(t.count(Method::Post, "/droplets/42/actions"), 1);
    assert_eq!(t.count(Method::Get, "/snapshots"), 0);
    assert_eq!(t.count(Method::Delete, "/snapshots/"), 0);
}

#[test]
fn test_poll_timeout_fails_at_confirmation() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = MockTransport::new()
        .on(Method::Post, &do_fixtures::route("/droplets/42/actions"), do_fixtures::created(13))
        .on(Method::Get, &do_fixtures::route("/actions/13"), do_fixtures::action(13, "in-progress"));
    let global = GlobalBuilder::new().poll(5, 15).build();
    let harness = TestHarness::with_global(global, transport);

    let result = harness.manage(&server);

    result.assert_failed_at(Stage::Confirming);
    assert!(result.error_detail.as_deref().unwrap().contains("did not complete within 15s"));
    assert_eq!(harness.transport.count(Method::Get, "/actions/13"), 4);
    assert_eq!(harness.sleeper.durations(), vec![Duration::from_secs(5); 3]);
    assert_eq!(harness.transport.count(Method::Get, "/snapshots"), 0);
}

#[test]
fn test_unavailable_poll_endpoint_respects_wait_budget() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = MockTransport::new()
        .on(Method::Post, &do_fixtures::route("/droplets/42/actions"), do_fixtures::created(13))
        .on(Method::Get, &do_fixtures::route("/actions/13"), HttpResponse::new(503, "upstream unavailable"));
    let global = GlobalBuilder::new().api_retries(3, 2).poll(5, 20).build();
    let harness = TestHarness::with_global(global, transport);

    let result = harness.manage(&server);

    result.assert_failed_at(Stage::Confirming);
    assert!(result.error_detail.as_deref().unwrap().contains("did not complete within 26s"));
    // three polls of three attempts; the last wait is trimmed to the budget
    assert_eq!(harness.transport.count(Method::Get, "/actions/13"), 9);
    assert_eq!(
        harness.sleeper.durations(),
        [2, 4, 5, 2, 4, 3, 2, 4].map(Duration::from_secs).to_vec()
    );
    assert_eq!(harness.transport.count(Method::Get, "/snapshots"), 0);
}

#[test]
fn test_errored_action_fails_at_confirmation() {
    let server = ServerBuilder::hetzner("app").build();
    let transport = MockTransport::new()
        .on(
            Method::Post,
            &hetzner_fixtures::route("/servers/42/actions/create_image"),
            hetzner_fixtures::created(4711, 9),
        )
        .on(Method::Get, &hetzner_fixtures::route("/actions/9"), hetzner_fixtures::action(9, "running"))
        .on(Method::Get, &hetzner_fixtures::route("/actions/9"), hetzner_fixtures::action(9, "error"));
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_failed_at(Stage::Confirming);
    assert_eq!(harness.transport.count(Method::Get, "/actions/9"), 2);
    assert_eq!(harness.transport.count(Method::Delete, "/images/"), 0);
}

#[test]
fn test_transient_poll_error_is_retried() {
    let server = ServerBuilder::digitalocean("web1").retain(5).build();
    let transport = MockTransport::new()
        .on(Method::Get, &do_fixtures::route("/actions/13"), HttpResponse::new(503, "upstream unavailable"))
        .on(Method::Get, &do_fixtures::route("/actions/13"), do_fixtures::action(13, "completed"));
    let transport = do_fixtures::happy_path(transport, &server, 1, 13);
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(harness.transport.count(Method::Get, "/actions/13"), 2);
    assert_eq!(harness.sleeper.durations(), vec![Duration::from_secs(2)]);
}

#[test]
fn test_failed_delete_counts_towards_total() {
    let server = ServerBuilder::digitalocean("web1").retain(1).build();
    let transport = MockTransport::new().on(
        Method::Delete,
        &do_fixtures::route("/snapshots/1000"),
        do_fixtures::error(403, "forbidden", "snapshot is locked"),
    );
    let transport = do_fixtures::happy_path(transport, &server, 2, 13);
    let harness = TestHarness::new(transport);

    let result = harness.manage(&server);

    result.assert_success();
    assert_eq!(result.deleted, 1);
    assert_eq!(result.delete_failures, 1);
    assert_eq!(result.total_snapshots, Some(2));
}

#[test]
fn test_batch_runs_servers_in_order_with_delay() {
    let web1 = ServerBuilder::digitalocean("web1").id("1").retain(2).build();
    let app = ServerBuilder::hetzner("app").id("2").retain(2).build();
    let broken = ServerBuilder::digitalocean("broken").id("3").build();

    let transport = MockTransport::new().on(
        Method::Post,
        &do_fixtures::route("/droplets/3/actions"),
        do_fixtures::error(422, "unprocessable_entity", "Droplet is locked"),
    );
    let transport = do_fixtures::happy_path(transport, &web1, 2, 11);
    let transport = hetzner_fixtures::happy_path(transport, &app, 2, 21);
    let global = GlobalBuilder::new().delay_between_servers(5).build();
    let harness = TestHarness::with_global(global, transport);

    let summary = harness.run(&[web1, app, broken]);

    let order: Vec<_> = summary.results.iter().map(|r| r.server_name.as_str()).collect();
    assert_eq!(order, vec!["web1", "app", "broken"]);
    let statuses: Vec<_> = summary.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![OperationStatus::Success, OperationStatus::Success, OperationStatus::Failure]
    );

    assert_eq!(harness.sleeper.durations(), vec![Duration::from_secs(5); 2]);
    assert_eq!(summary.summary_line(), "SUMMARY: 2 succeeded, 1 failed out of 3 total");
    assert_eq!(summary.exit_status(), ExitStatus::PartialFailure);
}

#[test]
fn test_batch_all_failed_exits_one() {
    let server = ServerBuilder::digitalocean("web1").build();
    let transport = MockTransport::new().on(
        Method::Post,
        &do_fixtures::route("/droplets/42/actions"),
        do_fixtures::error(401, "unauthorized", "Unable to authenticate you"),
    );
    let harness = TestHarness::new(transport);

    let summary = harness.run(&[server]);

    assert_eq!(summary.exit_status(), ExitStatus::Failure);
}

#[test]
fn test_empty_batch_is_success() {
    let harness = TestHarness::new(MockTransport::new());

    let summary = harness.run(&[]);

    assert_eq!(summary.total(), 0);
    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert!(harness.transport.requests().is_empty());
}
