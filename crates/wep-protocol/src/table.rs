//! Data-driven device identification table
//!
//! One row per dongle type, in fixed priority order. The identification
//! engine walks rows and commands in table order; classification tests a
//! response buffer against every row's patterns, again in table order, so a
//! banner matching two types always resolves to the higher-priority one.

use crate::types::DeviceType;

/// One step of a pairing handshake: send `command`, expect a response
/// containing `expect` (case-insensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeStep {
    pub command: &'static str,
    pub expect: &'static str,
}

/// A row of the identification table
#[derive(Debug, Clone, Copy)]
pub struct DeviceTypeSpec {
    /// Type this row classifies
    pub device_type: DeviceType,
    /// Identification commands, sent in order (newline appended on the wire)
    pub commands: &'static [&'static str],
    /// Case-insensitive substrings that mark a response as this type
    pub patterns: &'static [&'static str],
    /// Capabilities reported for devices of this type
    pub capabilities: &'static [&'static str],
    /// Whether this type supports the pairing handshake
    pub pairing_capable: bool,
    /// Pairing handshake steps (empty when not pairing-capable)
    pub handshake: &'static [HandshakeStep],
}

/// The identification table, in priority order
///
/// Priority resolves classification ties: BLE beats Zigbee beats Z-Wave beats
/// Matter beats Generic. New dongle types are added by appending a row.
pub const DEVICE_TABLE: &[DeviceTypeSpec] = &[
    DeviceTypeSpec {
        device_type: DeviceType::Ble,
        commands: &["AT", "AT+NAME?", "BLE_ID"],
        patterns: &["ble", "bluetooth", "nordic", "hci"],
        capabilities: &[
            "ble_central",
            "ble_scan",
            "gatt_client",
            "serial_communication",
        ],
        pairing_capable: true,
        handshake: &[
            HandshakeStep {
                command: "PAIR_REQUEST",
                expect: "PAIR_ACK",
            },
            HandshakeStep {
                command: "PAIR_CONFIRM",
                expect: "PAIR_OK",
            },
        ],
    },
    DeviceTypeSpec {
        device_type: DeviceType::Zigbee,
        commands: &["AT", "ZIGBEE_ID", "VERSION?"],
        patterns: &["zigbee", "coordinator", "ezsp", "znp"],
        capabilities: &[
            "zigbee_coordinator",
            "network_scan",
            "serial_communication",
        ],
        pairing_capable: true,
        handshake: &[
            HandshakeStep {
                command: "PERMIT_JOIN",
                expect: "JOIN_ACK",
            },
            HandshakeStep {
                command: "PAIR_CONFIRM",
                expect: "PAIR_OK",
            },
        ],
    },
    DeviceTypeSpec {
        device_type: DeviceType::ZWave,
        commands: &["ZWAVE_VERSION"],
        patterns: &["z-wave", "zwave", "serialapi"],
        capabilities: &[
            "zwave_controller",
            "node_management",
            "serial_communication",
        ],
        pairing_capable: false,
        handshake: &[],
    },
    DeviceTypeSpec {
        device_type: DeviceType::Matter,
        commands: &["MATTER_INFO"],
        patterns: &["matter", "thread", "openthread"],
        capabilities: &[
            "matter_controller",
            "thread_border_router",
            "serial_communication",
        ],
        pairing_capable: false,
        handshake: &[],
    },
    DeviceTypeSpec {
        device_type: DeviceType::Generic,
        commands: &["WHO_ARE_YOU"],
        patterns: &["dongle", "device", "ready"],
        capabilities: &["serial_communication", "basic_at_commands"],
        pairing_capable: false,
        handshake: &[],
    },
];

/// Look up the table row for a device type
///
/// Unknown has no row; an unclassified device carries no capabilities.
pub fn spec_for(device_type: DeviceType) -> Option<&'static DeviceTypeSpec> {
    DEVICE_TABLE.iter().find(|s| s.device_type == device_type)
}

/// Classify a response buffer against the whole table
///
/// Rows are tested in priority order, so a response matching several types
/// resolves to the first row regardless of which pattern arrived first in
/// time. Matching is a case-insensitive substring test over the lossy UTF-8
/// rendering of the buffer.
pub fn classify_response(buffer: &[u8]) -> Option<&'static DeviceTypeSpec> {
    if buffer.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(buffer).to_lowercase();
    DEVICE_TABLE
        .iter()
        .find(|spec| spec.patterns.iter().any(|p| text.contains(p)))
}

/// Total number of probe commands across all rows
///
/// The identification engine divides its timeout into this many per-attempt
/// slices.
pub fn total_probe_commands() -> usize {
    DEVICE_TABLE.iter().map(|s| s.commands.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_is_fixed() {
        let order: Vec<_> = DEVICE_TABLE.iter().map(|s| s.device_type).collect();
        assert_eq!(
            order,
            vec![
                DeviceType::Ble,
                DeviceType::Zigbee,
                DeviceType::ZWave,
                DeviceType::Matter,
                DeviceType::Generic,
            ]
        );
    }

    #[test]
    fn test_zigbee_coordinator_banner() {
        let spec = classify_response(b"EZSP COORDINATOR v7.4").unwrap();
        assert_eq!(spec.device_type, DeviceType::Zigbee);
        assert!(spec.capabilities.contains(&"zigbee_coordinator"));
    }

    #[test]
    fn test_tie_break_prefers_ble_over_generic() {
        // "BLE_DONGLE_READY" matches both the BLE row ("ble") and the
        // Generic row ("dongle", "ready"); priority order must win.
        let spec = classify_response(b"BLE_DONGLE_READY").unwrap();
        assert_eq!(spec.device_type, DeviceType::Ble);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            classify_response(b"ZiGbEe dongle").unwrap().device_type,
            DeviceType::Zigbee
        );
    }

    #[test]
    fn test_no_match_returns_none() {
        assert!(classify_response(b"garbage 1234").is_none());
        assert!(classify_response(b"").is_none());
    }

    #[test]
    fn test_only_ble_and_zigbee_pair() {
        for spec in DEVICE_TABLE {
            let expected =
                matches!(spec.device_type, DeviceType::Ble | DeviceType::Zigbee);
            assert_eq!(spec.pairing_capable, expected, "{}", spec.device_type);
            assert_eq!(spec.handshake.is_empty(), !expected);
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        let banner = b"Zigbee coordinator ready";
        let a = classify_response(banner).unwrap().device_type;
        let b = classify_response(banner).unwrap().device_type;
        assert_eq!(a, b);
    }
}
