//! Test context and run harness
//!
//! `TestContext` manages an on-disk settings layout for loader and CLI
//! tests; `TestHarness` wires a `SnapshotManager` to mocked HTTP and a
//! recording sleeper.

use crate::config_builder::{GlobalBuilder, ServerBuilder};
use snapshot_manager::api::retry::mock::RecordingSleeper;
use snapshot_manager::api::transport::mock::MockTransport;
use snapshot_manager::api::{HttpTransport, Sleeper};
use snapshot_manager::config::{GlobalConfig, ServerConfig};
use snapshot_manager::managers::snapshot::{
    execute_batch, BatchOutcome, BatchSummary, OperationResult, OperationStatus, RunSettings, SnapshotManager,
    Stage,
};
use snapshot_manager::utils::locker::InstanceLock;
use snapshot_manager::NotificationManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary settings layout: `snapshots.toml`, `configs/` and `logs/`
pub struct TestContext {
    temp_dir: TempDir,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Create a context with an empty `configs/` directory
    pub fn new() -> Self {
        let ctx = Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        };
        ctx.create_subdir("configs");
        ctx
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.temp_dir.path().join("configs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.temp_dir.path().join("logs")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.temp_dir.path().join("snapshots.toml")
    }

    /// Write `snapshots.toml` with the given contents
    pub fn write_settings(&self, contents: &str) -> PathBuf {
        self.create_file("snapshots.toml", contents)
    }

    /// Write a server file into `configs/`
    pub fn write_server(&self, file_name: &str, server: &ServerBuilder) -> PathBuf {
        let contents = serde_json::to_string_pretty(&server.to_json()).expect("Failed to serialise server");
        self.create_file(&format!("configs/{}", file_name), &contents)
    }

    /// Create a subdirectory in the temp dir
    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    /// Create a file in the temp dir
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }
}

/// A `SnapshotManager` on mocked HTTP with a recording sleeper
pub struct TestHarness {
    pub transport: MockTransport,
    pub sleeper: RecordingSleeper,
    manager: SnapshotManager,
}

impl TestHarness {
    /// Harness with default test settings (no delay between servers)
    pub fn new(transport: MockTransport) -> Self {
        Self::with_global(GlobalBuilder::new().build(), transport)
    }

    pub fn with_global(global: GlobalConfig, transport: MockTransport) -> Self {
        let sleeper = RecordingSleeper::new();
        let http: Arc<dyn HttpTransport> = Arc::new(transport.clone());
        let sleep: Arc<dyn Sleeper> = Arc::new(sleeper.clone());

        let notifier = NotificationManager::new(&global, http.clone(), sleep.clone());
        let mut settings = RunSettings::from_config(&global);
        settings.hostname = "test-host".to_string();

        Self {
            transport,
            sleeper,
            manager: SnapshotManager::new(settings, notifier, http, sleep),
        }
    }

    pub fn manager(&self) -> &SnapshotManager {
        &self.manager
    }

    /// Process one server end to end
    pub fn manage(&self, server: &ServerConfig) -> OperationResult {
        self.manager.manage_server(server)
    }

    pub fn run(&self, servers: &[ServerConfig]) -> BatchSummary {
        self.manager.run(servers)
    }

    /// Run under `lock` with an in-memory server list
    pub fn execute<L: InstanceLock + ?Sized>(&self, lock: &mut L, servers: Vec<ServerConfig>) -> BatchOutcome {
        execute_batch(lock, &self.manager, || (servers, Vec::new()))
    }
}

/// Assertions on a server's `OperationResult`
pub trait ResultAssertions {
    fn assert_success(&self) -> &Self;
    fn assert_failed_at(&self, stage: Stage) -> &Self;
}

impl ResultAssertions for OperationResult {
    fn assert_success(&self) -> &Self {
        assert_eq!(
            self.status,
            OperationStatus::Success,
            "expected SUCCESS for {}, got {:?}",
            self.server_name,
            self.error_detail
        );
        self
    }

    fn assert_failed_at(&self, stage: Stage) -> &Self {
        assert_eq!(self.status, OperationStatus::Failure, "expected FAILURE for {}", self.server_name);
        assert_eq!(self.stage, stage, "unexpected failure stage: {:?}", self.error_detail);
        assert!(self.error_detail.is_some());
        self
    }
}
