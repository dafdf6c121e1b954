//! Serial port scanner
//!
//! Enumerates candidate serial paths and filters them through include and
//! exclude glob patterns. A path is admitted when it matches at least one
//! include pattern and no exclude pattern.

use glob::Pattern;
use serialport::available_ports;
use tracing::{debug, info};

use crate::error::DetectError;

/// Serial port scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Glob patterns for paths to consider (e.g. `/dev/ttyUSB*`)
    pub include_patterns: Vec<String>,
    /// Glob patterns for paths to always skip (e.g. `/dev/ttyS*`)
    pub exclude_patterns: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            include_patterns: vec!["/dev/ttyUSB*".to_string(), "/dev/ttyACM*".to_string()],
            exclude_patterns: vec![
                "/dev/ttyS*".to_string(),
                "/dev/input*".to_string(),
                "/dev/hidraw*".to_string(),
            ],
        }
    }
}

/// Serial port scanner
pub struct PortScanner {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PortScanner {
    /// Create a scanner, compiling the configured glob patterns
    ///
    /// A malformed pattern is a startup-fatal configuration error.
    pub fn new(config: &ScannerConfig) -> Result<Self, DetectError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, DetectError> {
            patterns
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| {
                    Pattern::new(p.trim()).map_err(|e| DetectError::InvalidPattern {
                        pattern: p.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        };

        Ok(Self {
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
        })
    }

    /// Check whether a port path passes the include/exclude filters
    pub fn admits(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.include.iter().any(|p| p.matches(path))
    }

    /// Enumerate all admitted serial ports
    pub fn enumerate(&self) -> Result<Vec<String>, DetectError> {
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let mut admitted = Vec::new();
        for port in ports {
            if self.admits(&port.port_name) {
                admitted.push(port.port_name);
            } else {
                debug!("Port {} excluded by patterns", port.port_name);
            }
        }
        admitted.sort();

        if admitted.is_empty() {
            debug!("No candidate serial ports found");
        } else {
            info!("Found {} candidate serial port(s)", admitted.len());
        }

        Ok(admitted)
    }
}
