//! Core enums for device classification and lifecycle tracking

use serde::{Deserialize, Serialize};

/// Kind of wireless radio behind a serial dongle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Bluetooth Low Energy adapter
    Ble,
    /// Zigbee coordinator/router dongle
    Zigbee,
    /// Z-Wave controller stick
    #[serde(rename = "zwave")]
    ZWave,
    /// Matter/Thread border-router dongle
    Matter,
    /// Responds to serial traffic but matches no known banner
    Generic,
    /// Not yet classified
    Unknown,
}

impl DeviceType {
    /// Stable lowercase name used in bus payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ble => "ble",
            Self::Zigbee => "zigbee",
            Self::ZWave => "zwave",
            Self::Matter => "matter",
            Self::Generic => "generic",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection axis of a device entry
///
/// TimedOut is a reporting variant of Disconnected: both mean "no activity",
/// but TimedOut records that the silence exceeded the configured device
/// timeout rather than an explicit port loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Discovered,
    Identifying,
    Identified,
    Connected,
    Disconnected,
    TimedOut,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Identifying => "identifying",
            Self::Identified => "identified",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::TimedOut => "timed_out",
        }
    }

    /// Whether the device currently counts as reachable
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Identified | Self::Connected)
    }

    /// Whether the device is in a silence state that renewed traffic revives
    pub fn is_dormant(&self) -> bool {
        matches!(self, Self::Disconnected | Self::TimedOut)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pairing axis of a device entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    /// Device type cannot pair; permanent
    Unsupported,
    NotPaired,
    Pairing,
    Paired,
    PairingFailed,
}

impl PairingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::NotPaired => "not_paired",
            Self::Pairing => "pairing",
            Self::Paired => "paired",
            Self::PairingFailed => "pairing_failed",
        }
    }

    /// Check whether a transition along the pairing axis is legal
    ///
    /// Unsupported never leaves Unsupported. PairingFailed may only re-enter
    /// Pairing, which the registry permits solely on a fresh
    /// identification/reconnect cycle.
    pub fn can_transition_to(&self, next: PairingStatus) -> bool {
        use PairingStatus::*;
        match (self, next) {
            (Unsupported, Unsupported) => true,
            (Unsupported, _) => false,
            (NotPaired, Pairing) => true,
            (Pairing, Paired) | (Pairing, PairingFailed) => true,
            (PairingFailed, Pairing) => true,
            (Paired, NotPaired) => true,
            (a, b) => *a == b,
        }
    }
}

impl std::fmt::Display for PairingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_is_permanent() {
        for next in [
            PairingStatus::NotPaired,
            PairingStatus::Pairing,
            PairingStatus::Paired,
            PairingStatus::PairingFailed,
        ] {
            assert!(!PairingStatus::Unsupported.can_transition_to(next));
        }
        assert!(PairingStatus::Unsupported.can_transition_to(PairingStatus::Unsupported));
    }

    #[test]
    fn test_pairing_edge_set() {
        assert!(PairingStatus::NotPaired.can_transition_to(PairingStatus::Pairing));
        assert!(PairingStatus::Pairing.can_transition_to(PairingStatus::Paired));
        assert!(PairingStatus::Pairing.can_transition_to(PairingStatus::PairingFailed));
        assert!(PairingStatus::PairingFailed.can_transition_to(PairingStatus::Pairing));
        assert!(!PairingStatus::NotPaired.can_transition_to(PairingStatus::Paired));
        assert!(!PairingStatus::PairingFailed.can_transition_to(PairingStatus::Paired));
    }

    #[test]
    fn test_serde_names_match_bus_contract() {
        assert_eq!(
            serde_json::to_string(&DeviceType::ZWave).unwrap(),
            "\"zwave\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(
            serde_json::to_string(&PairingStatus::NotPaired).unwrap(),
            "\"not_paired\""
        );
    }
}
