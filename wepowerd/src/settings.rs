//! Daemon settings
//!
//! Settings come from an optional JSON file, overlaid with `WEPOWER_*`
//! environment variables so container deployments can configure everything
//! without a file. Durations are fractional seconds, matching the bus
//! payloads. Validation failures at startup are fatal; a daemon with a
//! broken port filter or an out-of-range scan cadence should never come up
//! half-working.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Broker address handed to the transport layer
    pub mqtt_broker: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// Per-port poll cadence in seconds (20ms to 60s)
    pub scan_interval: f64,
    /// Glob patterns for candidate serial ports
    pub include_patterns: Vec<String>,
    /// Glob patterns excluded even when included above
    pub exclude_patterns: Vec<String>,
    /// Publish discovery announcements for newly identified devices
    pub enable_discovery: bool,
    /// Probe ports to classify them; off means everything is generic
    pub enable_device_detection: bool,
    /// Seconds of silence before a device is marked timed out
    pub device_timeout: f64,
    /// Publish attempts per message before it is dropped
    pub retry_attempts: u32,
    /// Base retry delay in seconds (doubles per failed attempt)
    pub retry_delay: f64,
    /// Outbound queue capacity per device
    pub message_queue_size: usize,
    /// Overall identification budget per port in seconds
    pub identification_timeout: f64,
    /// Run pairing handshakes on capable devices
    pub enable_device_pairing: bool,
    /// Pairing handshake budget in seconds
    pub pairing_timeout: f64,
    /// Heartbeat evaluation cadence in seconds
    pub heartbeat_interval: f64,
    /// Quality below this is reported as degraded (0 to 1)
    pub connection_quality_threshold: f64,
    /// Publish registry summaries and per-device registry status
    pub enable_device_management: bool,
    /// Paired-device cap per device type
    pub max_paired_devices: usize,
    /// Baud rate for every opened port
    pub serial_baudrate: u32,
    /// How often to rescan for new ports, in seconds
    pub port_rescan_interval: f64,
    /// Grace period for flushing outbound queues on shutdown, in seconds
    pub shutdown_grace: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt_broker: "mqtt://localhost:1883".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            scan_interval: 1.0,
            include_patterns: vec![
                "/dev/ttyUSB*".to_string(),
                "/dev/ttyACM*".to_string(),
            ],
            exclude_patterns: vec![
                "/dev/ttyS*".to_string(),
                "/dev/input*".to_string(),
                "/dev/hidraw*".to_string(),
            ],
            enable_discovery: true,
            enable_device_detection: true,
            device_timeout: 60.0,
            retry_attempts: 3,
            retry_delay: 1.0,
            message_queue_size: 100,
            identification_timeout: 5.0,
            enable_device_pairing: true,
            pairing_timeout: 30.0,
            heartbeat_interval: 30.0,
            connection_quality_threshold: 0.5,
            enable_device_management: true,
            max_paired_devices: 10,
            serial_baudrate: 115_200,
            port_rescan_interval: 5.0,
            shutdown_grace: 3.0,
        }
    }
}

impl Settings {
    /// Load settings: file (when given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                        path: path.display().to_string(),
                        source,
                    })?;
                serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Overlay `WEPOWER_*` environment variables
    pub fn apply_env(&mut self) {
        env_set(&mut self.mqtt_broker, "WEPOWER_MQTT_BROKER");
        env_set_opt(&mut self.mqtt_username, "WEPOWER_MQTT_USERNAME");
        env_set_opt(&mut self.mqtt_password, "WEPOWER_MQTT_PASSWORD");
        env_set(&mut self.scan_interval, "WEPOWER_SCAN_INTERVAL");
        env_set_list(&mut self.include_patterns, "WEPOWER_INCLUDE_PATTERNS");
        env_set_list(&mut self.exclude_patterns, "WEPOWER_EXCLUDE_PATTERNS");
        env_set(&mut self.enable_discovery, "WEPOWER_ENABLE_DISCOVERY");
        env_set(
            &mut self.enable_device_detection,
            "WEPOWER_ENABLE_DEVICE_DETECTION",
        );
        env_set(&mut self.device_timeout, "WEPOWER_DEVICE_TIMEOUT");
        env_set(&mut self.retry_attempts, "WEPOWER_RETRY_ATTEMPTS");
        env_set(&mut self.retry_delay, "WEPOWER_RETRY_DELAY");
        env_set(&mut self.message_queue_size, "WEPOWER_MESSAGE_QUEUE_SIZE");
        env_set(
            &mut self.identification_timeout,
            "WEPOWER_IDENTIFICATION_TIMEOUT",
        );
        env_set(
            &mut self.enable_device_pairing,
            "WEPOWER_ENABLE_DEVICE_PAIRING",
        );
        env_set(&mut self.pairing_timeout, "WEPOWER_PAIRING_TIMEOUT");
        env_set(&mut self.heartbeat_interval, "WEPOWER_HEARTBEAT_INTERVAL");
        env_set(
            &mut self.connection_quality_threshold,
            "WEPOWER_CONNECTION_QUALITY_THRESHOLD",
        );
        env_set(
            &mut self.enable_device_management,
            "WEPOWER_ENABLE_DEVICE_MANAGEMENT",
        );
        env_set(&mut self.max_paired_devices, "WEPOWER_MAX_PAIRED_DEVICES");
        env_set(&mut self.serial_baudrate, "WEPOWER_SERIAL_BAUDRATE");
        env_set(
            &mut self.port_rescan_interval,
            "WEPOWER_PORT_RESCAN_INTERVAL",
        );
        env_set(&mut self.shutdown_grace, "WEPOWER_SHUTDOWN_GRACE");
    }

    /// Check every setting; any error here is fatal at startup
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.02..=60.0).contains(&self.scan_interval) {
            return Err(invalid(
                "scan_interval",
                format!("{} is outside 0.02..=60.0 seconds", self.scan_interval),
            ));
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            if pattern.trim().is_empty() {
                continue;
            }
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(invalid(
                    "include_patterns",
                    format!("malformed glob {:?}: {}", pattern, e),
                ));
            }
        }
        if self.identification_timeout <= 0.0 {
            return Err(invalid("identification_timeout", "must be positive"));
        }
        if self.device_timeout <= 0.0 {
            return Err(invalid("device_timeout", "must be positive"));
        }
        if self.heartbeat_interval <= 0.0 {
            return Err(invalid("heartbeat_interval", "must be positive"));
        }
        if self.pairing_timeout <= 0.0 {
            return Err(invalid("pairing_timeout", "must be positive"));
        }
        if self.retry_delay <= 0.0 {
            return Err(invalid("retry_delay", "must be positive"));
        }
        if self.port_rescan_interval <= 0.0 {
            return Err(invalid("port_rescan_interval", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.connection_quality_threshold) {
            return Err(invalid(
                "connection_quality_threshold",
                "must be within 0.0..=1.0",
            ));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry_attempts", "must be at least 1"));
        }
        if self.message_queue_size == 0 {
            return Err(invalid("message_queue_size", "must be at least 1"));
        }
        if self.serial_baudrate == 0 {
            return Err(invalid("serial_baudrate", "must be positive"));
        }
        Ok(())
    }

    pub fn scan_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval)
    }

    pub fn identification_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.identification_timeout)
    }

    pub fn device_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.device_timeout)
    }

    pub fn heartbeat_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval)
    }

    pub fn pairing_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.pairing_timeout)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }

    pub fn port_rescan_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.port_rescan_interval)
    }

    pub fn shutdown_grace_duration(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace)
    }
}

fn env_set<T: FromStr>(target: &mut T, key: &str) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *target = parsed;
        } else {
            tracing::warn!("Ignoring unparseable {}={:?}", key, value);
        }
    }
}

fn env_set_opt(target: &mut Option<String>, key: &str) {
    if let Ok(value) = std::env::var(key) {
        *target = Some(value);
    }
}

fn env_set_list(target: &mut Vec<String>, key: &str) {
    if let Ok(value) = std::env::var(key) {
        *target = value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_scan_interval_bounds() {
        let mut settings = Settings::default();
        settings.scan_interval = 0.01;
        assert!(settings.validate().is_err());
        settings.scan_interval = 61.0;
        assert!(settings.validate().is_err());
        settings.scan_interval = 0.02;
        settings.validate().unwrap();
    }

    #[test]
    fn test_malformed_glob_rejected() {
        let mut settings = Settings::default();
        settings.include_patterns = vec!["/dev/tty[".to_string()];
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
    }

    #[test]
    fn test_quality_threshold_bounds() {
        let mut settings = Settings::default();
        settings.connection_quality_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"scan_interval": 0.5, "retry_attempts": 7}}"#).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.scan_interval, 0.5);
        assert_eq!(settings.retry_attempts, 7);
        // Unlisted keys keep their defaults
        assert_eq!(settings.serial_baudrate, 115_200);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            Settings::load(Some(file.path())),
            Err(SettingsError::Parse { .. })
        ));
    }
}
