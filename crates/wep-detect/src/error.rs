//! Error types for port detection

use thiserror::Error;

/// Errors that can occur during scanning and identification
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// Invalid include/exclude pattern (startup-fatal)
    #[error("invalid port pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failed to open serial port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// I/O error during probe or polling
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
