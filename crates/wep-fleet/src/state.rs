//! Device entry state tracking

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use wep_protocol::{device_slug, unix_ts, ConnectionState, DeviceType, PairingStatus};

/// The registry's record for one dongle, keyed by device path
///
/// Owned exclusively by the registry; every other component sees snapshots.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    /// Device path (unique key, e.g. `/dev/ttyUSB0`)
    pub path: String,
    /// Filesystem-safe slug used in device-addressed topics
    pub slug: String,
    /// Classified type (Unknown until identification completes)
    pub device_type: DeviceType,
    /// Classifying-response digest; empty until assigned, then immutable for
    /// the connection epoch
    pub fingerprint: String,
    /// Capabilities from the identification table
    pub capabilities: Vec<String>,
    /// Connection axis
    pub state: ConnectionState,
    /// Pairing axis
    pub pairing: PairingStatus,
    /// Heartbeat-derived quality, always in [0, 1]
    pub quality: f64,
    /// Quality fell below the configured threshold
    pub degraded: bool,
    /// Classification came from a banner match rather than the fallback
    pub verified: bool,
    /// Sample of the classifying response bytes
    pub response_sample: Vec<u8>,
    /// How long the last identification run took
    pub identification_time: Duration,
    /// Monotonic timestamp of the most recent traffic or probe reply
    pub last_seen: Instant,
    /// Monotonic timestamp of the most recent heartbeat evaluation
    pub last_heartbeat: Option<Instant>,
    /// Wall-clock mirror of creation time, for payloads only
    pub discovered_at_ts: f64,
    /// Wall-clock mirror of `last_seen`, for payloads only
    pub last_seen_ts: f64,
}

impl DeviceEntry {
    /// Create a fresh entry in Discovered state
    pub fn new(path: &str) -> Self {
        let now_ts = unix_ts();
        Self {
            path: path.to_string(),
            slug: device_slug(path),
            device_type: DeviceType::Unknown,
            fingerprint: String::new(),
            capabilities: Vec::new(),
            state: ConnectionState::Discovered,
            pairing: PairingStatus::NotPaired,
            quality: 1.0,
            degraded: false,
            verified: false,
            response_sample: Vec::new(),
            identification_time: Duration::ZERO,
            last_seen: Instant::now(),
            last_heartbeat: None,
            discovered_at_ts: now_ts,
            last_seen_ts: now_ts,
        }
    }

    /// Stamp activity timestamps
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.last_seen_ts = unix_ts();
    }

    /// Take an immutable snapshot for events and queries
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            path: self.path.clone(),
            slug: self.slug.clone(),
            device_type: self.device_type,
            fingerprint: self.fingerprint.clone(),
            capabilities: self.capabilities.clone(),
            state: self.state,
            pairing: self.pairing,
            quality: self.quality,
            degraded: self.degraded,
            verified: self.verified,
            response_sample: String::from_utf8_lossy(&self.response_sample).into_owned(),
            identification_time: self.identification_time.as_secs_f64(),
            discovered_at: self.discovered_at_ts,
            last_seen: self.last_seen_ts,
        }
    }
}

/// Immutable view of a device entry, safe to send across tasks
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub path: String,
    pub slug: String,
    pub device_type: DeviceType,
    pub fingerprint: String,
    pub capabilities: Vec<String>,
    pub state: ConnectionState,
    pub pairing: PairingStatus,
    pub quality: f64,
    pub degraded: bool,
    pub verified: bool,
    pub response_sample: String,
    pub identification_time: f64,
    pub discovered_at: f64,
    pub last_seen: f64,
}

/// Aggregate registry counts for the summary topic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySummary {
    pub total_devices: usize,
    pub device_types: BTreeMap<String, usize>,
    pub status_counts: BTreeMap<String, usize>,
    pub pairing_status_counts: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_defaults() {
        let entry = DeviceEntry::new("/dev/ttyUSB0");
        assert_eq!(entry.slug, "dev_ttyUSB0");
        assert_eq!(entry.state, ConnectionState::Discovered);
        assert_eq!(entry.device_type, DeviceType::Unknown);
        assert_eq!(entry.pairing, PairingStatus::NotPaired);
        assert_eq!(entry.quality, 1.0);
        assert!(entry.fingerprint.is_empty());
    }

    #[test]
    fn test_snapshot_mirrors_entry() {
        let mut entry = DeviceEntry::new("/dev/ttyACM1");
        entry.device_type = DeviceType::Zigbee;
        entry.fingerprint = "a1b2c3d4".to_string();
        entry.response_sample = b"COORDINATOR".to_vec();

        let snap = entry.snapshot();
        assert_eq!(snap.slug, "dev_ttyACM1");
        assert_eq!(snap.device_type, DeviceType::Zigbee);
        assert_eq!(snap.response_sample, "COORDINATOR");
    }
}
