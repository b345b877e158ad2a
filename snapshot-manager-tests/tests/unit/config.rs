//! Settings and server file loading

use snapshot_manager::config::{self, ConfigError};
use snapshot_manager::Provider;
use test_utils::{ServerBuilder, TestContext};

#[test]
fn test_global_settings_partial_file_keeps_defaults() {
    let ctx = TestContext::new();
    let path = ctx.write_settings(
        r#"
[timing]
poll_interval = 10

[telegram]
bot_token = "111:abc"
chat_id = -100123
"#,
    );

    let global = config::load_global_config(&path).unwrap();

    assert_eq!(global.timing.poll_interval, 10);
    assert_eq!(global.timing.snapshot_creation_timeout, 900);
    assert_eq!(global.api.retries, 3);
    assert_eq!(global.telegram.chat_id.as_deref(), Some("-100123"));
    assert_eq!(global.files.log_file, "snapshots.log");
}

#[test]
fn test_global_settings_invalid_toml() {
    let ctx = TestContext::new();
    let path = ctx.write_settings("[timing\npoll_interval = ");

    let err = config::load_global_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseToml { .. }));
}

#[test]
fn test_zero_retries_rejected() {
    let ctx = TestContext::new();
    let path = ctx.write_settings("[api]\nretries = 0\n");

    assert!(config::load_global_config(&path).is_err());
}

#[test]
fn test_paths_resolve_against_settings_directory() {
    let ctx = TestContext::new();
    let path = ctx.write_settings("[directories]\nconfigs_dir = \"servers\"\n");
    let global = config::load_global_config(&path).unwrap();

    let paths = global.paths(ctx.temp_dir());

    assert_eq!(paths.configs_dir, ctx.temp_dir().join("servers"));
    assert_eq!(paths.lock_file, ctx.logs_dir().join("snapshots.lock"));
}

#[test]
fn test_server_file_round_trip_through_disk() {
    let ctx = TestContext::new();
    let path = ctx.write_server("web1.json", &ServerBuilder::digitalocean("web1").id("3164444").retain(7).with_telegram());

    let server = config::load_server_config(&path).unwrap();

    assert_eq!(server.provider, Provider::DigitalOcean);
    assert_eq!(server.id, "3164444");
    assert_eq!(server.retain_last_snapshots, 7);
    assert!(server.telegram.as_ref().and_then(|t| t.bot_token.as_ref()).is_some());
}

#[test]
fn test_server_file_with_invalid_json() {
    let ctx = TestContext::new();
    let path = ctx.create_file("configs/broken.json", "{\"hetzner_cloud_server\": {");

    let err = config::load_server_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseJson { .. }));
}

#[test]
fn test_discover_all_json_files_sorted() {
    let ctx = TestContext::new();
    ctx.write_server("b.json", &ServerBuilder::hetzner("b"));
    ctx.write_server("a.json", &ServerBuilder::digitalocean("a"));
    ctx.create_file("configs/notes.txt", "ignored");
    ctx.create_file("configs/._a.json", "resource fork");

    let (files, skipped) = config::discover_server_files(&ctx.configs_dir(), &[]).unwrap();

    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json"]);
    assert!(skipped.is_empty());
}

#[test]
fn test_discover_requested_files_only() {
    let ctx = TestContext::new();
    ctx.write_server("a.json", &ServerBuilder::digitalocean("a"));
    ctx.write_server("b.json", &ServerBuilder::hetzner("b"));

    let requested = vec!["b.json".to_string(), "readme.md".to_string()];
    let (files, skipped) = config::discover_server_files(&ctx.configs_dir(), &requested).unwrap();

    assert_eq!(files, vec![ctx.configs_dir().join("b.json")]);
    assert_eq!(skipped.len(), 1);
    assert!(matches!(skipped[0], ConfigError::NotJson(_)));
}

#[test]
fn test_load_servers_collects_errors_per_file() {
    let ctx = TestContext::new();
    let good = ctx.write_server("good.json", &ServerBuilder::digitalocean("good"));
    let bad = ctx.create_file("configs/bad.json", r#"{"aws_instance": {"id": 1}}"#);

    let (servers, errors) = config::load_servers(&[good, bad]);

    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].name, "good");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ConfigError::UnknownProvider(_)));
}
