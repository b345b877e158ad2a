use anyhow::{Context, Result};
use clap::Parser;
use snapshot_manager::api::{HttpTransport, ReqwestTransport, Sleeper, ThreadSleeper};
use snapshot_manager::config::{
    self, discover_server_files, load_servers, resolve_telegram, resolve_webhook, ConfigError, GlobalConfig,
    ResolvedPaths, ServerConfig,
};
use snapshot_manager::managers::snapshot::SCRIPT_NAME;
use snapshot_manager::utils::locker::FileLock;
use snapshot_manager::{
    execute_batch, init_console_logging, init_logging, BatchOutcome, ExitStatus, LoggingConfig,
    NotificationManager, RunSettings, SnapshotManager,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "snapshot-manager")]
#[command(about = "Create and rotate DigitalOcean and Hetzner Cloud server snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the global settings file
    #[arg(short, long, default_value = "snapshots.toml")]
    config: PathBuf,

    /// Mirror INFO logs to the console
    #[arg(short, long)]
    verbose: bool,

    /// Validate settings and server files without contacting any provider
    #[arg(long)]
    validate: bool,

    /// Server files to process, relative to the configs directory
    /// (defaults to every *.json file there)
    configs: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::from(ExitStatus::Failure.code())
        }
    }
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let global = if cli.config.exists() {
        match config::load_global_config(&cli.config) {
            Ok(global) => global,
            Err(e) => {
                init_console_logging(cli.verbose);
                error!("{}", e);
                return Ok(ExitStatus::Failure);
            }
        }
    } else {
        eprintln!(
            "WARNING: Settings file '{}' not found, using built-in defaults",
            cli.config.display()
        );
        GlobalConfig::default()
    };

    let base_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let paths = global.paths(&base_dir);

    if cli.validate {
        init_console_logging(cli.verbose);
        return Ok(validate(&global, &paths, &cli.configs));
    }

    if !paths.configs_dir.is_dir() {
        eprintln!(
            "ERROR: Configs directory '{}' does not exist",
            paths.configs_dir.display()
        );
        return Ok(ExitStatus::Failure);
    }

    // Setup logging with file rotation (must keep guard alive)
    let logging_config = LoggingConfig::from_config(
        &paths.logs_dir,
        &paths.log_file,
        &global.logging.level,
        global.logging.max_files,
        cli.verbose,
    );
    let _log_guard = match init_logging(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("WARNING: File logging unavailable ({:#}), logging to console only", e);
            init_console_logging(cli.verbose);
            None
        }
    };

    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new().context("Failed to initialise HTTP client")?);
    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);

    let notifier = NotificationManager::new(&global, transport.clone(), sleeper.clone());
    let manager = SnapshotManager::new(RunSettings::from_config(&global), notifier, transport, sleeper);
    let mut lock = FileLock::new(&paths.lock_file);

    let outcome = execute_batch(&mut lock, &manager, || {
        load_for_run(&paths.configs_dir, &cli.configs)
    });

    match &outcome {
        BatchOutcome::LockHeld(e) => eprintln!("ERROR: {}. Exiting.", e),
        BatchOutcome::Completed(summary) => eprintln!("{}", summary.summary_line()),
    }

    Ok(outcome.exit_status())
}

/// Discover and load server files; problems become per-server errors
fn load_for_run(configs_dir: &Path, requested: &[String]) -> (Vec<ServerConfig>, Vec<ConfigError>) {
    match discover_server_files(configs_dir, requested) {
        Ok((files, skipped)) => {
            for reason in &skipped {
                warn!("{}", reason);
            }
            if files.is_empty() {
                info!("No server configuration files found in {:?}", configs_dir);
            }
            load_servers(&files)
        }
        Err(e) => (Vec::new(), vec![e]),
    }
}

/// Print a configuration report. Takes no lock and makes no API calls.
fn validate(global: &GlobalConfig, paths: &ResolvedPaths, requested: &[String]) -> ExitStatus {
    println!("{} configuration check", SCRIPT_NAME);
    println!("Configs directory: {}", paths.configs_dir.display());
    println!("Logs directory: {}", paths.logs_dir.display());
    println!();

    let (files, skipped) = match discover_server_files(&paths.configs_dir, requested) {
        Ok(found) => found,
        Err(e) => {
            println!("✗ {}", e);
            return ExitStatus::Failure;
        }
    };

    let mut invalid = 0;
    for path in &files {
        match config::load_server_config(path) {
            Ok(server) => {
                let mut channels = Vec::new();
                if resolve_telegram(&server, global).is_active() {
                    channels.push("Telegram");
                }
                if resolve_webhook(&server, global).is_active() {
                    channels.push("Webhook");
                }
                println!(
                    "✓ {}: {} '{}' (ID: {}, retain {}, notifications: {})",
                    path.display(),
                    server.provider,
                    server.name,
                    server.id,
                    server.retain_last_snapshots,
                    if channels.is_empty() { "None".to_string() } else { channels.join(", ") }
                );
            }
            Err(e) => {
                invalid += 1;
                println!("✗ {}", e);
            }
        }
    }

    for reason in &skipped {
        println!("- {}", reason);
    }

    println!();
    println!("Servers: {} valid, {} invalid", files.len() - invalid, invalid);

    if invalid == 0 {
        ExitStatus::Success
    } else {
        ExitStatus::Failure
    }
}
