//! Error types for the fleet engine

use thiserror::Error;

use wep_protocol::PairingStatus;

/// Errors that can occur in registry operations
#[derive(Debug, Error)]
pub enum FleetError {
    /// Device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Illegal pairing transition attempted
    #[error("illegal pairing transition {from} -> {to} for {path}")]
    IllegalPairingTransition {
        path: String,
        from: PairingStatus,
        to: PairingStatus,
    },
}
