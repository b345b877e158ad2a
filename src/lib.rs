//! Snapshot Manager Library
//!
//! Creates, confirms and rotates provider-side server snapshots for
//! DigitalOcean droplets and Hetzner Cloud servers, and reports each
//! server's outcome through Telegram and webhook notifications.

pub mod api;
pub mod config;
pub mod error;
pub mod managers;
pub mod providers;
pub mod retention;
pub mod utils;

// Re-export commonly used types
pub use config::{load_global_config, load_server_config, GlobalConfig, ServerConfig};
pub use error::{NotificationError, SnapshotError};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::{DeliveryOutcome, NotificationManager, NotifyReport};
pub use managers::snapshot::{
    execute_batch, BatchOutcome, BatchSummary, ExitStatus, OperationResult, OperationStatus, RunSettings,
    SnapshotManager,
};
pub use providers::{Provider, Snapshot, SnapshotProvider};
pub use retention::{decide, RetentionDecision};
