//! Error types for the snapshot pipeline and notification delivery

use crate::api::ApiError;
use thiserror::Error;

/// Failure of a snapshot operation for one server
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("action {action_id} finished with an error")]
    ActionFailed { action_id: String },

    #[error("action {action_id} did not complete within {waited_secs}s")]
    PollTimeout { action_id: String, waited_secs: u64 },

    #[error("response is missing field '{0}'")]
    MissingField(String),
}

/// Failure to deliver a notification. Never affects the exit status.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("{channel} delivery failed: {source}")]
    Delivery {
        channel: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("invalid {channel} template: {reason}")]
    InvalidTemplate { channel: &'static str, reason: String },
}
