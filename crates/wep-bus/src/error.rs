//! Error types for the bus layer

use thiserror::Error;

/// Errors that can occur delivering to or receiving from the bus
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport is gone or not accepting publishes
    #[error("bus transport offline")]
    Offline,

    /// The transport rejected a publish
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Payload could not be serialized
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
