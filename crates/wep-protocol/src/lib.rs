//! WePower IoT Protocol Library
//!
//! This crate defines the shared vocabulary of the dongle fleet manager:
//! device type enums, the data-driven identification table, response
//! fingerprinting, bus topic construction, and the JSON payload shapes
//! published to and consumed from the message bus.
//!
//! The identification table is the single place where a dongle type's probe
//! commands, response patterns, capabilities, and pairing handshake live.
//! Adding support for a new dongle type is a table append; the engines in
//! `wep-detect` and `wep-fleet` are generic over the table rows.
//!
//! # Example
//!
//! ```rust
//! use wep_protocol::{classify_response, DeviceType};
//!
//! let row = classify_response(b"ZIGBEE COORDINATOR v3.2").unwrap();
//! assert_eq!(row.device_type, DeviceType::Zigbee);
//! ```

pub mod fingerprint;
pub mod payload;
pub mod table;
pub mod topic;
pub mod types;

pub use fingerprint::fingerprint;
pub use payload::{
    unix_ts, CommandPayload, DataPayload, DeviceInfo, DiscoveryMetadata, DiscoveryPayload,
    HeartbeatPayload, IdentificationPayload, StatusPayload, SummaryPayload,
};
pub use table::{
    classify_response, spec_for, total_probe_commands, DeviceTypeSpec, HandshakeStep, DEVICE_TABLE,
};
pub use topic::{device_slug, parse_inbound, InboundTopic, TOPIC_PREFIX};
pub use types::{ConnectionState, DeviceType, PairingStatus};
