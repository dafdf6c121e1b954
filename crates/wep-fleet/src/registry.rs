//! Device registry
//!
//! Pure state machine over the device map. Every operation is total: it
//! mutates entries and returns the events the change produced, without
//! doing any I/O. The actor owns the single instance and serializes all
//! mutation through it.
//!
//! Connection lifecycle: Discovered -> Identifying -> Identified ->
//! Connected, with Disconnected (port lost) and TimedOut (prolonged
//! silence) as dormant exits. A dormant device that talks again is
//! re-identified, which starts a new connection epoch with a fresh
//! fingerprint.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use wep_detect::Classification;
use wep_protocol::{ConnectionState, PairingStatus};

use crate::error::FleetError;
use crate::events::FleetEvent;
use crate::heartbeat::update_quality;
use crate::state::{DeviceEntry, DeviceSnapshot, RegistrySummary};

/// What the caller should do after recording port traffic
#[derive(Debug, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Traffic from an identified device; forwarded as a Data event
    Forwarded,
    /// Traffic from a dormant device; identification must be re-run
    ReidentifyNeeded,
    /// Traffic recorded without further action
    Noted,
}

/// The device map and its state machine
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&DeviceEntry> {
        self.devices.get(path)
    }

    pub fn snapshot(&self, path: &str) -> Option<DeviceSnapshot> {
        self.devices.get(path).map(DeviceEntry::snapshot)
    }

    /// Find a device by its topic slug
    pub fn resolve_slug(&self, slug: &str) -> Option<&DeviceEntry> {
        self.devices.values().find(|entry| entry.slug == slug)
    }

    pub fn paths(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Count of devices of one type currently paired
    pub fn paired_count(&self, device_type: wep_protocol::DeviceType) -> usize {
        self.devices
            .values()
            .filter(|e| e.device_type == device_type && e.pairing == PairingStatus::Paired)
            .count()
    }

    /// A port opened: create the entry, or start a new connection epoch for
    /// a returning device
    pub fn port_opened(&mut self, path: &str) -> Vec<FleetEvent> {
        match self.devices.get_mut(path) {
            Some(entry) => {
                debug!("Port {} reopened; starting new connection epoch", path);
                entry.state = ConnectionState::Discovered;
                entry.fingerprint.clear();
                entry.quality = 1.0;
                entry.degraded = false;
                entry.last_heartbeat = None;
                entry.touch();
                vec![FleetEvent::StatusChanged {
                    snapshot: entry.snapshot(),
                    error: None,
                }]
            }
            None => {
                info!("New device at {}", path);
                let entry = DeviceEntry::new(path);
                let snapshot = entry.snapshot();
                self.devices.insert(path.to_string(), entry);
                vec![FleetEvent::StatusChanged {
                    snapshot,
                    error: None,
                }]
            }
        }
    }

    /// Identification started on a port
    pub fn mark_identifying(&mut self, path: &str) -> Vec<FleetEvent> {
        let Some(entry) = self.devices.get_mut(path) else {
            return Vec::new();
        };
        entry.state = ConnectionState::Identifying;
        vec![FleetEvent::StatusChanged {
            snapshot: entry.snapshot(),
            error: None,
        }]
    }

    /// Identification finished: classify the entry and move it to Identified
    ///
    /// The first classification of a connection epoch also announces the
    /// device on the discovery channel.
    pub fn apply_classification(
        &mut self,
        path: &str,
        classification: &Classification,
    ) -> Vec<FleetEvent> {
        let Some(entry) = self.devices.get_mut(path) else {
            warn!("Classification for unknown device {}", path);
            return Vec::new();
        };

        let first_of_epoch = entry.fingerprint.is_empty();

        entry.device_type = classification.device_type;
        entry.fingerprint = classification.fingerprint.clone();
        entry.capabilities = classification.capabilities.clone();
        entry.verified = classification.verified;
        entry.response_sample = classification.response_sample.clone();
        entry.identification_time = classification.identification_time;
        entry.state = ConnectionState::Identified;
        entry.pairing = if classification.pairing_capable() {
            // A returning device keeps its pairing outcome across epochs
            match entry.pairing {
                PairingStatus::Paired => PairingStatus::Paired,
                _ => PairingStatus::NotPaired,
            }
        } else {
            PairingStatus::Unsupported
        };
        entry.touch();

        info!(
            "Identified {} as {} (fingerprint {})",
            path, entry.device_type, entry.fingerprint
        );

        let snapshot = entry.snapshot();
        let mut events = Vec::new();
        if first_of_epoch {
            events.push(FleetEvent::Discovered {
                snapshot: snapshot.clone(),
            });
        }
        events.push(FleetEvent::Identification {
            snapshot: snapshot.clone(),
        });
        events.push(FleetEvent::StatusChanged {
            snapshot,
            error: None,
        });
        events
    }

    /// Stamp activity without emitting anything (handshake frames that were
    /// consumed by a pairing session still count as liveness)
    pub fn touch(&mut self, path: &str) {
        if let Some(entry) = self.devices.get_mut(path) {
            entry.touch();
        }
    }

    /// Record port traffic
    pub fn record_activity(
        &mut self,
        path: &str,
        data: &[u8],
    ) -> (ActivityOutcome, Vec<FleetEvent>) {
        let Some(entry) = self.devices.get_mut(path) else {
            return (ActivityOutcome::Noted, Vec::new());
        };
        entry.touch();

        match entry.state {
            ConnectionState::Identified | ConnectionState::Connected => (
                ActivityOutcome::Forwarded,
                vec![FleetEvent::Data {
                    snapshot: entry.snapshot(),
                    data: data.to_vec(),
                }],
            ),
            ConnectionState::Disconnected | ConnectionState::TimedOut => {
                info!("Dormant device {} is talking again", path);
                entry.fingerprint.clear();
                (ActivityOutcome::ReidentifyNeeded, Vec::new())
            }
            _ => (ActivityOutcome::Noted, Vec::new()),
        }
    }

    /// Fold one heartbeat sweep outcome into a device
    ///
    /// A successful heartbeat promotes Identified to Connected. Quality
    /// crossing below the threshold raises a degradation status exactly once
    /// per crossing.
    pub fn record_heartbeat(
        &mut self,
        path: &str,
        success: bool,
        quality_threshold: f64,
    ) -> Vec<FleetEvent> {
        let Some(entry) = self.devices.get_mut(path) else {
            return Vec::new();
        };
        if !entry.state.is_connected() {
            return Vec::new();
        }

        entry.quality = update_quality(entry.quality, success);
        entry.last_heartbeat = Some(Instant::now());

        let mut events = Vec::new();

        if success && entry.state == ConnectionState::Identified {
            entry.state = ConnectionState::Connected;
            events.push(FleetEvent::StatusChanged {
                snapshot: entry.snapshot(),
                error: None,
            });
        }

        let now_degraded = entry.quality < quality_threshold;
        if now_degraded != entry.degraded {
            entry.degraded = now_degraded;
            if now_degraded {
                warn!(
                    "Connection quality degraded on {} ({:.2} < {:.2})",
                    path, entry.quality, quality_threshold
                );
                events.push(FleetEvent::StatusChanged {
                    snapshot: entry.snapshot(),
                    error: Some("connection quality degraded".to_string()),
                });
            } else {
                events.push(FleetEvent::StatusChanged {
                    snapshot: entry.snapshot(),
                    error: None,
                });
            }
        }

        events.push(FleetEvent::Heartbeat {
            snapshot: entry.snapshot(),
            alive: success,
        });
        events
    }

    /// Move devices silent for at least `device_timeout` to TimedOut
    pub fn sweep_timeouts(&mut self, now: Instant, device_timeout: Duration) -> Vec<FleetEvent> {
        let mut events = Vec::new();
        for entry in self.devices.values_mut() {
            if !entry.state.is_connected() {
                continue;
            }
            if now.duration_since(entry.last_seen) >= device_timeout {
                warn!("Device {} timed out", entry.path);
                entry.state = ConnectionState::TimedOut;
                events.push(FleetEvent::StatusChanged {
                    snapshot: entry.snapshot(),
                    error: Some("device timeout".to_string()),
                });
            }
        }
        events
    }

    /// A port went away
    pub fn mark_lost(&mut self, path: &str) -> Vec<FleetEvent> {
        let Some(entry) = self.devices.get_mut(path) else {
            return Vec::new();
        };
        if entry.state == ConnectionState::Disconnected {
            return Vec::new();
        }
        info!("Device {} disconnected", path);
        entry.state = ConnectionState::Disconnected;
        vec![FleetEvent::StatusChanged {
            snapshot: entry.snapshot(),
            error: Some("port lost".to_string()),
        }]
    }

    /// Drop an entry whose port the scanner no longer enumerates
    ///
    /// Transient port errors only mark a device Disconnected; removal is
    /// reserved for hardware that is physically gone.
    pub fn remove(&mut self, path: &str) -> Option<DeviceEntry> {
        let entry = self.devices.remove(path);
        if entry.is_some() {
            info!("Device {} removed; port no longer present", path);
        }
        entry
    }

    /// Apply a pairing status transition, validating it against the legal
    /// edge set
    pub fn record_pairing(
        &mut self,
        path: &str,
        to: PairingStatus,
    ) -> Result<Vec<FleetEvent>, FleetError> {
        let entry = self
            .devices
            .get_mut(path)
            .ok_or_else(|| FleetError::DeviceNotFound(path.to_string()))?;

        if !entry.pairing.can_transition_to(to) {
            return Err(FleetError::IllegalPairingTransition {
                path: path.to_string(),
                from: entry.pairing,
                to,
            });
        }
        if entry.pairing == to {
            return Ok(Vec::new());
        }

        info!("Pairing on {}: {} -> {}", path, entry.pairing, to);
        entry.pairing = to;
        let error = match to {
            PairingStatus::PairingFailed => Some("pairing failed".to_string()),
            _ => None,
        };
        Ok(vec![FleetEvent::StatusChanged {
            snapshot: entry.snapshot(),
            error,
        }])
    }

    /// Aggregate counts over the whole registry
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary {
            total_devices: self.devices.len(),
            ..Default::default()
        };
        for entry in self.devices.values() {
            *summary
                .device_types
                .entry(entry.device_type.as_str().to_string())
                .or_insert(0) += 1;
            *summary
                .status_counts
                .entry(entry.state.as_str().to_string())
                .or_insert(0) += 1;
            *summary
                .pairing_status_counts
                .entry(entry.pairing.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }
}
