//! Snapshot orchestration: per-server pipeline and the batch runner
//!
//! Each server goes through `CREATING -> CONFIRMING -> LISTING -> PRUNING ->
//! DONE`. A failure in creation or confirmation ends that server with a
//! FAILURE result; listing and pruning problems never undo a successful
//! snapshot. One server's failure never stops the batch.

use crate::api::{HttpTransport, Sleeper};
use crate::config::{ApiConfig, ConfigError, GlobalConfig, ServerConfig};
use crate::managers::notification::NotificationManager;
use crate::providers::{adapter_for, wait_for_action, PollSettings, Provider, SnapshotProvider};
use crate::retention::decide;
use crate::utils::locker::{InstanceLock, LockError, LockGuard};
use crate::utils::sanitize::{mask_token, sanitize_with};
use crate::utils::template::TemplateVars;
use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name reported in logs and notifications
pub const SCRIPT_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Failure,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Creating,
    Confirming,
    Listing,
    Pruning,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Creating => "CREATING",
            Stage::Confirming => "CONFIRMING",
            Stage::Listing => "LISTING",
            Stage::Pruning => "PRUNING",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Outcome of one server's pipeline, handed to the notification dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub server_name: String,
    pub server_id: String,
    pub provider: Provider,
    pub status: OperationStatus,
    /// Last stage reached
    pub stage: Stage,
    pub snapshot_name: Option<String>,
    /// `None` when the snapshot list could not be fetched after creation
    pub total_snapshots: Option<usize>,
    pub deleted: usize,
    pub delete_failures: usize,
    pub timestamp: String,
    pub hostname: String,
    pub script_name: String,
    pub error_detail: Option<String>,
}

impl OperationResult {
    fn start(server: &ServerConfig, settings: &RunSettings) -> Self {
        Self {
            server_name: server.name.clone(),
            server_id: server.id.clone(),
            provider: server.provider,
            status: OperationStatus::Failure,
            stage: Stage::Creating,
            snapshot_name: None,
            total_snapshots: None,
            deleted: 0,
            delete_failures: 0,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            hostname: settings.hostname.clone(),
            script_name: settings.script_name.clone(),
            error_detail: None,
        }
    }

    /// Result for a server whose pipeline failed at `stage`
    fn failed(mut self, stage: Stage, detail: String) -> Self {
        error!("  ✗ {} failed at {}: {}", self.server_name, stage, detail);
        self.status = OperationStatus::Failure;
        self.stage = stage;
        self.error_detail = Some(detail);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Snapshot name for display, `none` when no snapshot was confirmed
    pub fn snapshot_label(&self) -> &str {
        self.snapshot_name.as_deref().unwrap_or("none")
    }

    /// Total for display, `unknown` when listing failed
    pub fn total_label(&self) -> String {
        self.total_snapshots
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Human summary of the snapshot count
    pub fn snapshot_info(&self) -> String {
        match self.total_snapshots {
            Some(n) => format!("{} snapshots exist", n),
            None => "unknown".to_string(),
        }
    }

    /// Placeholder values for notification templates
    pub fn template_vars(&self) -> TemplateVars {
        TemplateVars::new()
            .set("script", self.script_name.clone())
            .set("provider", self.provider.as_str())
            .set("server_name", self.server_name.clone())
            .set("server_id", self.server_id.clone())
            .set("status", self.status.as_str())
            .set("hostname", self.hostname.clone())
            .set("timestamp", self.timestamp.clone())
            .set("snapshot_name", self.snapshot_label())
            .set("total_snapshots", self.total_label())
            .set("snapshot_info", self.snapshot_info())
            .set("error_detail", self.error_detail.clone().unwrap_or_default())
    }

    /// Pipe-separated status line written to the log for every server
    pub fn final_status_line(&self) -> String {
        format!(
            "FINAL_STATUS | {} | {} | {} | {} | {} | {} | {} | {}",
            self.script_name,
            self.provider,
            self.server_name,
            self.status,
            self.hostname,
            self.timestamp,
            self.snapshot_label(),
            self.snapshot_info()
        )
    }
}

/// Process-wide settings shared by every server in a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub script_name: String,
    pub hostname: String,
    pub poll: PollSettings,
    pub delay_between_servers: Duration,
    pub api: ApiConfig,
}

impl RunSettings {
    pub fn from_config(global: &GlobalConfig) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            script_name: SCRIPT_NAME.to_string(),
            hostname,
            poll: PollSettings::new(
                Duration::from_secs(global.timing.poll_interval),
                Duration::from_secs(global.timing.snapshot_creation_timeout),
            ),
            delay_between_servers: Duration::from_secs(global.timing.delay_between_servers),
            api: global.api.clone(),
        }
    }
}

/// Aggregate of one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub results: Vec<OperationResult>,
    /// Server files that could not be loaded
    pub config_failures: usize,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded() + self.config_failures
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.config_failures
    }

    pub fn summary_line(&self) -> String {
        format!(
            "SUMMARY: {} succeeded, {} failed out of {} total",
            self.succeeded(),
            self.failed(),
            self.total()
        )
    }

    /// Nothing to do or nothing failed is success; all failed is failure;
    /// anything else is partial.
    pub fn exit_status(&self) -> ExitStatus {
        match (self.succeeded(), self.failed()) {
            (_, 0) => ExitStatus::Success,
            (0, _) => ExitStatus::Failure,
            _ => ExitStatus::PartialFailure,
        }
    }
}

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    /// Every server failed, or a critical startup error
    Failure = 1,
    PartialFailure = 2,
    /// Another instance holds the lock
    LockHeld = 3,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Result of [`execute_batch`]
#[derive(Debug)]
pub enum BatchOutcome {
    LockHeld(LockError),
    Completed(BatchSummary),
}

impl BatchOutcome {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            BatchOutcome::LockHeld(_) => ExitStatus::LockHeld,
            BatchOutcome::Completed(summary) => summary.exit_status(),
        }
    }
}

/// Drives the snapshot pipeline for every configured server
pub struct SnapshotManager {
    settings: RunSettings,
    notifier: NotificationManager,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
}

impl SnapshotManager {
    pub fn new(
        settings: RunSettings,
        notifier: NotificationManager,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            settings,
            notifier,
            transport,
            sleeper,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Run the pipeline for one server against `provider`
    pub fn process_server(&self, server: &ServerConfig, provider: &dyn SnapshotProvider) -> OperationResult {
        let secrets = [server.api_token.as_str()];
        let mut result = OperationResult::start(server, &self.settings);

        let snapshot_name = format!("{}-{}", server.name, Local::now().format("%Y%m%d%H%M%S"));
        info!("  Creating snapshot '{}'", snapshot_name);

        let handle = match provider.create_snapshot(&snapshot_name) {
            Ok(handle) => handle,
            Err(e) => {
                let detail = sanitize_with(&format!("creation failed: {}", e), &secrets);
                return result.failed(Stage::Creating, detail);
            }
        };

        result.stage = Stage::Confirming;
        debug!(
            "  Waiting for action {} (image: {})",
            handle.action_id,
            handle.snapshot_id.as_deref().unwrap_or("pending")
        );
        if let Err(e) = wait_for_action(provider, &handle, &self.settings.poll, self.sleeper.as_ref()) {
            let detail = sanitize_with(&format!("confirmation failed: {}", e), &secrets);
            return result.failed(Stage::Confirming, detail);
        }
        info!("  ✓ Snapshot '{}' created", snapshot_name);

        result.status = OperationStatus::Success;
        result.snapshot_name = Some(snapshot_name);
        result.stage = Stage::Listing;

        let snapshots = match provider.list_snapshots() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                let detail = sanitize_with(&format!("listing failed after creation: {}", e), &secrets);
                warn!("  Snapshot created but {}; skipping retention", detail);
                result.error_detail = Some(detail);
                return result;
            }
        };

        result.stage = Stage::Pruning;
        let decision = decide(&snapshots, server.retain_last_snapshots as usize);
        info!(
            "  Retention: {} snapshot(s) found, keeping {}, deleting {}",
            snapshots.len(),
            decision.keep.len(),
            decision.delete.len()
        );

        for snapshot in &decision.delete {
            match provider.delete_snapshot(&snapshot.id) {
                Ok(()) => {
                    info!("    ✓ Deleted snapshot {} ({})", snapshot.name, snapshot.id);
                    result.deleted += 1;
                }
                Err(e) => {
                    warn!(
                        "    ✗ Failed to delete snapshot {} ({}): {}",
                        snapshot.name,
                        snapshot.id,
                        sanitize_with(&e.to_string(), &secrets)
                    );
                    result.delete_failures += 1;
                }
            }
        }

        result.total_snapshots = Some(decision.keep.len() + result.delete_failures);
        result.stage = Stage::Done;
        result
    }

    /// Process one server end to end: provider calls, status line and
    /// notifications
    pub fn manage_server(&self, server: &ServerConfig) -> OperationResult {
        info!("Processing {} server: {} (ID: {})", server.provider, server.name, server.id);
        debug!("  API token: {}", mask_token(&server.api_token));
        info!(
            "  Notifications: {}",
            self.notifier.channel_summary(server)
        );

        let adapter = adapter_for(
            server,
            &self.settings.api,
            self.transport.clone(),
            self.sleeper.clone(),
        );
        let result = self.process_server(server, adapter.as_ref());

        info!("{}", result.final_status_line());
        self.notifier.notify(server, &result);
        result
    }

    /// Process servers sequentially, pausing between them
    pub fn run(&self, servers: &[ServerConfig]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (index, server) in servers.iter().enumerate() {
            if index > 0 && !self.settings.delay_between_servers.is_zero() {
                debug!(
                    "Waiting {}s before next server",
                    self.settings.delay_between_servers.as_secs()
                );
                self.sleeper.sleep(self.settings.delay_between_servers);
            }
            summary.results.push(self.manage_server(server));
        }

        summary
    }
}

/// Take the instance lock, load servers and run the batch.
///
/// When the lock is held, returns immediately without calling `load` or
/// touching any provider. The lock is released on every return path.
pub fn execute_batch<L, F>(lock: &mut L, manager: &SnapshotManager, load: F) -> BatchOutcome
where
    L: InstanceLock + ?Sized,
    F: FnOnce() -> (Vec<ServerConfig>, Vec<ConfigError>),
{
    let _guard = match LockGuard::acquire(lock) {
        Ok(guard) => guard,
        Err(e) => {
            error!("Could not acquire lock: {}", e);
            return BatchOutcome::LockHeld(e);
        }
    };

    info!("========== {} session started ==========", SCRIPT_NAME);

    let (servers, errors) = load();
    for e in &errors {
        error!("{}. Skipping.", e);
    }
    info!("Loaded {} server configuration(s)", servers.len());

    let mut summary = manager.run(&servers);
    summary.config_failures = errors.len();

    info!("{}", summary.summary_line());
    info!("========== {} session finished ==========", SCRIPT_NAME);
    BatchOutcome::Completed(summary)
}
