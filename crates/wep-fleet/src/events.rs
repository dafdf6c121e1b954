//! Events emitted by the fleet actor
//!
//! Each event carries a full snapshot of the device it concerns so the
//! dispatcher can build payloads without querying back into the registry.

use crate::state::{DeviceSnapshot, RegistrySummary};

/// Events published by the fleet actor to the message dispatcher
#[derive(Debug, Clone)]
pub enum FleetEvent {
    /// A device was identified for the first time in this connection epoch
    Discovered { snapshot: DeviceSnapshot },
    /// Identification finished (emitted on every run, including re-runs)
    Identification { snapshot: DeviceSnapshot },
    /// Connection state or pairing status changed
    StatusChanged {
        snapshot: DeviceSnapshot,
        error: Option<String>,
    },
    /// Periodic heartbeat evaluation for one device
    Heartbeat { snapshot: DeviceSnapshot, alive: bool },
    /// Raw traffic read from an identified device's port
    Data {
        snapshot: DeviceSnapshot,
        data: Vec<u8>,
    },
    /// Periodic aggregate of the whole registry
    Summary { summary: RegistrySummary },
}

impl FleetEvent {
    /// Device path this event concerns, if any
    pub fn device_path(&self) -> Option<&str> {
        match self {
            FleetEvent::Discovered { snapshot }
            | FleetEvent::Identification { snapshot }
            | FleetEvent::StatusChanged { snapshot, .. }
            | FleetEvent::Heartbeat { snapshot, .. }
            | FleetEvent::Data { snapshot, .. } => Some(&snapshot.path),
            FleetEvent::Summary { .. } => None,
        }
    }
}
