//! Fleet actor
//!
//! Single task that owns the device registry, the map of port command
//! senders, and all in-flight pairing sessions. Port lifecycle events,
//! traffic, and queries arrive as [`FleetCommand`]s; lifecycle changes leave
//! as [`FleetEvent`]s. Heartbeat, timeout, and pairing-expiry sweeps run on
//! timers inside the loop, so no lock ever guards the registry.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use wep_detect::{Classification, PortTaskCommand};
use wep_protocol::{spec_for, PairingStatus};

use crate::events::FleetEvent;
use crate::heartbeat::LIVENESS_PROBE;
use crate::pairing::{PairingSession, SessionProgress};
use crate::registry::{ActivityOutcome, DeviceRegistry};
use crate::state::{DeviceSnapshot, RegistrySummary};

/// Lifecycle tuning for the fleet actor
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Cadence of heartbeat evaluation per device
    pub heartbeat_interval: Duration,
    /// Silence after which a device is marked TimedOut
    pub device_timeout: Duration,
    /// Budget for one pairing handshake
    pub pairing_timeout: Duration,
    /// Whether pairing handshakes run at all
    pub enable_pairing: bool,
    /// Paired-device cap per device type
    pub max_paired_devices: usize,
    /// Quality below this is reported as degraded
    pub connection_quality_threshold: f64,
    /// Cadence of registry summary events
    pub summary_interval: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            device_timeout: Duration::from_secs(60),
            pairing_timeout: Duration::from_secs(30),
            enable_pairing: true,
            max_paired_devices: 10,
            connection_quality_threshold: 0.5,
            summary_interval: Duration::from_secs(60),
        }
    }
}

/// Commands accepted by the fleet actor
#[derive(Debug)]
pub enum FleetCommand {
    /// A port task came up; carries the sender for writes to that port
    PortOpened {
        path: String,
        cmd_tx: mpsc::Sender<PortTaskCommand>,
    },
    /// Identification started
    PortIdentifying { path: String },
    /// Identification finished
    PortIdentified {
        path: String,
        classification: Classification,
    },
    /// Raw traffic from a port
    PortData { path: String, data: Vec<u8> },
    /// Port task ended
    PortLost { path: String },
    /// The scanner no longer enumerates this port; drop the device entry
    PortRemoved { path: String },
    /// Snapshot of one device
    QueryDevice {
        path: String,
        response: oneshot::Sender<Option<DeviceSnapshot>>,
    },
    /// Look up a device by topic slug, returning its port write handle
    ResolveDevice {
        device_id: String,
        response: oneshot::Sender<Option<mpsc::Sender<PortTaskCommand>>>,
    },
    /// Aggregate registry counts
    QuerySummary {
        response: oneshot::Sender<RegistrySummary>,
    },
    /// Stop the actor
    Shutdown,
}

struct FleetActor {
    config: FleetConfig,
    registry: DeviceRegistry,
    ports: HashMap<String, mpsc::Sender<PortTaskCommand>>,
    sessions: HashMap<String, PairingSession>,
    events: mpsc::Sender<FleetEvent>,
}

impl FleetActor {
    async fn emit(&self, events: Vec<FleetEvent>) {
        for event in events {
            let _ = self.events.send(event).await;
        }
    }

    async fn write_port(&self, path: &str, data: Vec<u8>) {
        if let Some(tx) = self.ports.get(path) {
            let _ = tx.send(PortTaskCommand::SendData { data }).await;
        }
    }

    async fn handle_identified(&mut self, path: String, classification: Classification) {
        let pairing_capable = classification.pairing_capable();
        let device_type = classification.device_type;
        let events = self.registry.apply_classification(&path, &classification);
        self.emit(events).await;

        if !self.config.enable_pairing || !pairing_capable {
            return;
        }
        let already_paired = self
            .registry
            .get(&path)
            .is_some_and(|e| e.pairing == PairingStatus::Paired);
        if already_paired {
            return;
        }
        if self.registry.paired_count(device_type) >= self.config.max_paired_devices {
            info!(
                "Pairing cap reached for {}; leaving {} unpaired",
                device_type, path
            );
            return;
        }

        let Some(spec) = spec_for(device_type) else {
            return;
        };
        let Some(session) = PairingSession::start(spec.handshake, self.config.pairing_timeout)
        else {
            return;
        };

        match self.registry.record_pairing(&path, PairingStatus::Pairing) {
            Ok(events) => self.emit(events).await,
            Err(e) => {
                debug!("Not starting pairing on {}: {}", path, e);
                return;
            }
        }
        info!("Starting pairing handshake on {}", path);
        let command = format!("{}\n", session.current_command());
        self.sessions.insert(path.clone(), session);
        self.write_port(&path, command.into_bytes()).await;
    }

    async fn handle_data(&mut self, path: String, data: Vec<u8>) {
        if let Some(session) = self.sessions.get_mut(&path) {
            match session.observe(&data) {
                SessionProgress::Advanced { command } => {
                    self.registry.touch(&path);
                    self.write_port(&path, format!("{}\n", command).into_bytes())
                        .await;
                    return;
                }
                SessionProgress::Completed => {
                    self.sessions.remove(&path);
                    self.registry.touch(&path);
                    info!("Pairing completed on {}", path);
                    match self.registry.record_pairing(&path, PairingStatus::Paired) {
                        Ok(events) => self.emit(events).await,
                        Err(e) => warn!("Pairing completion rejected on {}: {}", path, e),
                    }
                    return;
                }
                SessionProgress::NoMatch => {}
            }
        }

        let (outcome, events) = self.registry.record_activity(&path, &data);
        self.emit(events).await;
        if outcome == ActivityOutcome::ReidentifyNeeded {
            if let Some(tx) = self.ports.get(&path) {
                let _ = tx.send(PortTaskCommand::Reidentify).await;
            }
        }
    }

    async fn handle_lost(&mut self, path: String) {
        if self.sessions.remove(&path).is_some() {
            match self
                .registry
                .record_pairing(&path, PairingStatus::PairingFailed)
            {
                Ok(events) => self.emit(events).await,
                Err(e) => debug!("Pairing abort on lost port {}: {}", path, e),
            }
        }
        self.ports.remove(&path);
        let events = self.registry.mark_lost(&path);
        self.emit(events).await;
    }

    async fn handle_removed(&mut self, path: String) {
        self.sessions.remove(&path);
        if let Some(tx) = self.ports.remove(&path) {
            let _ = tx.send(PortTaskCommand::Shutdown).await;
        }
        self.registry.remove(&path);
    }

    /// Heartbeat sweep: passive liveness first, then probe the silent ones
    async fn heartbeat_sweep(&mut self) {
        let now = Instant::now();
        let mut outcomes = Vec::new();
        for path in self.registry.paths() {
            let Some(entry) = self.registry.get(&path) else {
                continue;
            };
            if !entry.state.is_connected() {
                continue;
            }
            let success =
                now.duration_since(entry.last_seen) < self.config.heartbeat_interval;
            outcomes.push((path, success));
        }

        for (path, success) in outcomes {
            if !success {
                self.write_port(&path, LIVENESS_PROBE.to_vec()).await;
            }
            let events = self.registry.record_heartbeat(
                &path,
                success,
                self.config.connection_quality_threshold,
            );
            self.emit(events).await;
        }

        let events = self
            .registry
            .sweep_timeouts(now, self.config.device_timeout);
        self.emit(events).await;

        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expired(now))
            .map(|(path, _)| path.clone())
            .collect();
        for path in expired {
            warn!("Pairing timed out on {}", path);
            self.sessions.remove(&path);
            match self
                .registry
                .record_pairing(&path, PairingStatus::PairingFailed)
            {
                Ok(events) => self.emit(events).await,
                Err(e) => debug!("Pairing expiry on {}: {}", path, e),
            }
        }
    }
}

/// Run the fleet actor until Shutdown or the command channel closes
pub async fn run_fleet_actor(
    config: FleetConfig,
    mut cmd_rx: mpsc::Receiver<FleetCommand>,
    event_tx: mpsc::Sender<FleetEvent>,
) {
    let mut heartbeat = interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately; skip it so sweeps start one interval in
    heartbeat.tick().await;

    let mut summary = interval(config.summary_interval);
    summary.set_missed_tick_behavior(MissedTickBehavior::Skip);
    summary.tick().await;

    let mut actor = FleetActor {
        config,
        registry: DeviceRegistry::new(),
        ports: HashMap::new(),
        sessions: HashMap::new(),
        events: event_tx,
    };

    info!("Fleet actor started");
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(FleetCommand::PortOpened { path, cmd_tx }) => {
                        actor.ports.insert(path.clone(), cmd_tx);
                        let events = actor.registry.port_opened(&path);
                        actor.emit(events).await;
                    }
                    Some(FleetCommand::PortIdentifying { path }) => {
                        let events = actor.registry.mark_identifying(&path);
                        actor.emit(events).await;
                    }
                    Some(FleetCommand::PortIdentified { path, classification }) => {
                        actor.handle_identified(path, classification).await;
                    }
                    Some(FleetCommand::PortData { path, data }) => {
                        actor.handle_data(path, data).await;
                    }
                    Some(FleetCommand::PortLost { path }) => {
                        actor.handle_lost(path).await;
                    }
                    Some(FleetCommand::PortRemoved { path }) => {
                        actor.handle_removed(path).await;
                    }
                    Some(FleetCommand::QueryDevice { path, response }) => {
                        let _ = response.send(actor.registry.snapshot(&path));
                    }
                    Some(FleetCommand::ResolveDevice { device_id, response }) => {
                        let sender = actor
                            .registry
                            .resolve_slug(&device_id)
                            .and_then(|entry| actor.ports.get(&entry.path).cloned());
                        let _ = response.send(sender);
                    }
                    Some(FleetCommand::QuerySummary { response }) => {
                        let _ = response.send(actor.registry.summary());
                    }
                    Some(FleetCommand::Shutdown) | None => {
                        info!("Fleet actor shutting down");
                        for (path, tx) in &actor.ports {
                            if tx.send(PortTaskCommand::Shutdown).await.is_err() {
                                debug!("Port task for {} already gone", path);
                            }
                        }
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                actor.heartbeat_sweep().await;
            }

            _ = summary.tick() => {
                let summary = actor.registry.summary();
                let _ = actor.events.send(FleetEvent::Summary { summary }).await;
            }
        }
    }
}
