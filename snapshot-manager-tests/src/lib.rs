//! Test utilities for snapshot-manager
//!
//! This crate provides shared builders, canned provider responses and a
//! mocked run harness for testing the snapshot pipeline without network
//! access.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{do_fixtures, MockTransport, ServerBuilder, TestHarness};
//!
//! #[test]
//! fn my_test() {
//!     let server = ServerBuilder::digitalocean("web1").retain(3).build();
//!     let transport = do_fixtures::happy_path(MockTransport::new(), &server, 5, 13);
//!     let harness = TestHarness::new(transport);
//!     let summary = harness.run(&[server]);
//!     // ... assertions
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::{GlobalBuilder, ServerBuilder};
pub use fixtures::*;
pub use test_context::{ResultAssertions, TestContext, TestHarness};

// Re-export types from the main crate for convenience
pub use snapshot_manager::config::{
    GlobalConfig, ServerConfig, TelegramDefaults, TelegramOverrides, WebhookDefaults, WebhookOverrides,
};
pub use snapshot_manager::managers::snapshot::{BatchSummary, OperationResult, OperationStatus, Stage};
pub use snapshot_manager::providers::{Provider, Snapshot};

// Re-export mock implementations from the main crate
pub use snapshot_manager::api::retry::mock::RecordingSleeper;
pub use snapshot_manager::api::transport::mock::MockTransport;
pub use snapshot_manager::api::{HttpResponse, HttpTransport, Method, TransportError};
pub use snapshot_manager::utils::locker::{InstanceLock, MemoryLock};

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
