//! JSON payload shapes published to and consumed from the bus
//!
//! Field names here are the bus contract; renaming a field is a breaking
//! change for every subscriber.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionState, DeviceType, PairingStatus};

/// Wall-clock timestamp as fractional unix seconds
///
/// Deadlines and timeouts use monotonic clocks; this is only for reporting.
pub fn unix_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// `wepower_iot/discovery/{fingerprint}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryPayload {
    pub device_path: String,
    pub device_type: DeviceType,
    pub fingerprint: String,
    pub capabilities: Vec<String>,
    pub discovered_at: f64,
    pub metadata: DiscoveryMetadata,
}

/// Raw identification metadata carried in a discovery payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryMetadata {
    /// Lossy-UTF-8 sample of the classifying response
    pub response_sample: String,
    /// Seconds the identification run took
    pub identification_time: f64,
}

/// `wepower_iot/{device_id}/data`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPayload {
    pub device: String,
    pub data: String,
    pub ts: f64,
    pub device_type: DeviceType,
    pub fingerprint: String,
}

/// Device snapshot embedded in status payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub device_path: String,
    pub device_type: DeviceType,
    pub fingerprint: String,
    pub capabilities: Vec<String>,
    pub last_seen: f64,
    pub is_connected: bool,
    pub pairing_status: PairingStatus,
    pub connection_quality: f64,
}

/// `wepower_iot/{device_id}/status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub device: String,
    pub state: ConnectionState,
    pub error: Option<String>,
    pub ts: f64,
    pub device_info: DeviceInfo,
}

/// `wepower_iot/{device_id}/heartbeat`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatPayload {
    pub device: String,
    pub heartbeat: bool,
    pub connection_quality: f64,
    pub ts: f64,
}

/// `wepower_iot/{device_id}/identification`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentificationPayload {
    pub device: String,
    pub device_type: DeviceType,
    pub fingerprint: String,
    /// False when the device fell through to Generic without a banner match
    pub verified: bool,
    pub capabilities: Vec<String>,
    pub identification_time: f64,
    pub ts: f64,
}

/// `wepower_iot/registry/summary`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryPayload {
    pub total_devices: usize,
    pub device_types: BTreeMap<String, usize>,
    pub status_counts: BTreeMap<String, usize>,
    pub pairing_status_counts: BTreeMap<String, usize>,
    pub ts: f64,
}

/// Inbound `wepower_iot/{device_id}/command`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandPayload {
    pub command: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_payload_field_names() {
        let payload = StatusPayload {
            device: "dev_ttyUSB0".to_string(),
            state: ConnectionState::Connected,
            error: None,
            ts: 1.5,
            device_info: DeviceInfo {
                device_path: "/dev/ttyUSB0".to_string(),
                device_type: DeviceType::Ble,
                fingerprint: "a1b2c3d4".to_string(),
                capabilities: vec!["ble_central".to_string()],
                last_seen: 1.0,
                is_connected: true,
                pairing_status: PairingStatus::Paired,
                connection_quality: 0.9,
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["device_info"]["pairing_status"], "paired");
        assert_eq!(json["device_info"]["is_connected"], true);
        assert_eq!(json["device_info"]["connection_quality"], 0.9);
    }

    #[test]
    fn test_command_payload_timestamp_optional() {
        let cmd: CommandPayload = serde_json::from_str(r#"{"command":"reset"}"#).unwrap();
        assert_eq!(cmd.command, "reset");
        assert!(cmd.timestamp.is_none());

        let cmd: CommandPayload =
            serde_json::from_str(r#"{"command":"scan","timestamp":17.0}"#).unwrap();
        assert_eq!(cmd.timestamp, Some(17.0));
    }

    #[test]
    fn test_summary_round_trips() {
        let mut device_types = BTreeMap::new();
        device_types.insert("ble".to_string(), 2);
        let payload = SummaryPayload {
            total_devices: 2,
            device_types,
            status_counts: BTreeMap::new(),
            pairing_status_counts: BTreeMap::new(),
            ts: 42.0,
        };
        let back: SummaryPayload =
            serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert_eq!(back, payload);
    }
}
