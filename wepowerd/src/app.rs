//! Daemon wiring and supervision
//!
//! Owns the rescan loop and the channel graph: port tasks feed the fleet
//! actor, the actor's events flow through a policy filter into the
//! dispatcher, and inbound bus traffic goes through the router back to the
//! ports. Shutdown stops the actor first, then gives the dispatcher a
//! grace period to flush outbound queues.

use std::collections::HashSet;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use wep_bus::{run_dispatcher, run_router, BusCommand, BusMessage, DispatcherConfig};
use wep_detect::{spawn_port_task, PortEvent, PortScanner, PortTask, ProbeConfig, ScannerConfig};
use wep_fleet::{run_fleet_actor, FleetCommand, FleetConfig, FleetEvent};

use crate::settings::Settings;

/// Which fleet events reach the bus under the current policy toggles
fn event_allowed(settings: &Settings, event: &FleetEvent) -> bool {
    match event {
        FleetEvent::Discovered { .. } => settings.enable_discovery,
        FleetEvent::Summary { .. } => settings.enable_device_management,
        _ => true,
    }
}

fn fleet_config(settings: &Settings) -> FleetConfig {
    FleetConfig {
        heartbeat_interval: settings.heartbeat_interval_duration(),
        device_timeout: settings.device_timeout_duration(),
        pairing_timeout: settings.pairing_timeout_duration(),
        enable_pairing: settings.enable_device_pairing,
        max_paired_devices: settings.max_paired_devices,
        connection_quality_threshold: settings.connection_quality_threshold,
        summary_interval: settings.heartbeat_interval_duration(),
    }
}

fn dispatcher_config(settings: &Settings) -> DispatcherConfig {
    DispatcherConfig {
        queue_size: settings.message_queue_size,
        retry_attempts: settings.retry_attempts,
        retry_delay: settings.retry_delay_duration(),
    }
}

/// Run the daemon until Ctrl-C
pub async fn run(
    settings: Settings,
    bus_tx: mpsc::Sender<BusCommand>,
    inbound_rx: mpsc::Receiver<BusMessage>,
) -> anyhow::Result<()> {
    let scanner = PortScanner::new(&ScannerConfig {
        include_patterns: settings.include_patterns.clone(),
        exclude_patterns: settings.exclude_patterns.clone(),
    })
    .context("compiling port filter patterns")?;

    let (fleet_tx, fleet_rx) = mpsc::channel(256);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (dispatch_tx, dispatch_rx) = mpsc::channel(256);
    let (port_event_tx, mut port_event_rx) = mpsc::channel(256);

    tokio::spawn(run_fleet_actor(fleet_config(&settings), fleet_rx, event_tx));
    tokio::spawn(run_router(inbound_rx, fleet_tx.clone(), bus_tx.clone()));
    let dispatcher = tokio::spawn(run_dispatcher(
        dispatch_rx,
        bus_tx,
        dispatcher_config(&settings),
    ));

    // Policy filter between the actor and the dispatcher
    let filter_settings = settings.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !event_allowed(&filter_settings, &event) {
                continue;
            }
            if dispatch_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let probe_config = ProbeConfig {
        identification_timeout: settings.identification_timeout_duration(),
        ..ProbeConfig::default()
    };

    let mut rescan = interval(settings.port_rescan_interval_duration());
    rescan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut open: HashSet<String> = HashSet::new();
    let mut known: HashSet<String> = HashSet::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Daemon running; watching for ports");
    loop {
        tokio::select! {
            _ = rescan.tick() => {
                let ports = match scanner.enumerate() {
                    Ok(ports) => ports,
                    Err(e) => {
                        warn!("Port enumeration failed: {}", e);
                        continue;
                    }
                };
                let current: HashSet<String> = ports.iter().cloned().collect();
                // Ports that fell out of enumeration take their registry
                // entries with them; transient I/O errors only disconnect
                let vanished: Vec<String> =
                    known.difference(&current).cloned().collect();
                for path in vanished {
                    info!("Port {} gone; removing its device entry", path);
                    open.remove(&path);
                    if fleet_tx
                        .send(FleetCommand::PortRemoved { path })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                known = current;
                for path in ports {
                    if open.contains(&path) {
                        continue;
                    }
                    match PortTask::open(
                        &path,
                        settings.serial_baudrate,
                        settings.scan_interval_duration(),
                        probe_config.clone(),
                        settings.enable_device_detection,
                        port_event_tx.clone(),
                    ) {
                        Ok(task) => {
                            spawn_port_task(task).await;
                            open.insert(path);
                        }
                        Err(e) => warn!("Could not open {}: {}", path, e),
                    }
                }
            }

            event = port_event_rx.recv() => {
                let Some(event) = event else { break };
                let command = match event {
                    PortEvent::Opened { path, cmd_tx } => {
                        FleetCommand::PortOpened { path, cmd_tx }
                    }
                    PortEvent::Identifying { path } => {
                        FleetCommand::PortIdentifying { path }
                    }
                    PortEvent::Identified { path, classification } => {
                        FleetCommand::PortIdentified { path, classification }
                    }
                    PortEvent::Data { path, data } => {
                        FleetCommand::PortData { path, data }
                    }
                    PortEvent::Lost { path } => {
                        open.remove(&path);
                        FleetCommand::PortLost { path }
                    }
                };
                if fleet_tx.send(command).await.is_err() {
                    break;
                }
            }

            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Stop the actor; its event channel closing lets the dispatcher drain
    let _ = fleet_tx.send(FleetCommand::Shutdown).await;
    drop(fleet_tx);
    drop(port_event_tx);

    match timeout(settings.shutdown_grace_duration(), dispatcher).await {
        Ok(_) => debug!("Dispatcher drained"),
        Err(_) => warn!(
            "Dispatcher did not drain within {:.1}s; dropping remaining messages",
            settings.shutdown_grace
        ),
    }
    info!("Daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wep_fleet::{DeviceSnapshot, RegistrySummary};
    use wep_protocol::{ConnectionState, DeviceType, PairingStatus};

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot {
            path: "/dev/ttyUSB0".to_string(),
            slug: "dev_ttyUSB0".to_string(),
            device_type: DeviceType::Ble,
            fingerprint: "a1b2c3d4".to_string(),
            capabilities: Vec::new(),
            state: ConnectionState::Identified,
            pairing: PairingStatus::NotPaired,
            quality: 1.0,
            degraded: false,
            verified: true,
            response_sample: String::new(),
            identification_time: 0.1,
            discovered_at: 0.0,
            last_seen: 0.0,
        }
    }

    #[test]
    fn test_discovery_toggle_filters_discovery_only() {
        let mut settings = Settings::default();
        settings.enable_discovery = false;

        let discovered = FleetEvent::Discovered {
            snapshot: snapshot(),
        };
        let data = FleetEvent::Data {
            snapshot: snapshot(),
            data: b"frame".to_vec(),
        };
        assert!(!event_allowed(&settings, &discovered));
        assert!(event_allowed(&settings, &data));
    }

    #[test]
    fn test_management_toggle_filters_summaries() {
        let mut settings = Settings::default();
        settings.enable_device_management = false;

        let summary = FleetEvent::Summary {
            summary: RegistrySummary::default(),
        };
        assert!(!event_allowed(&settings, &summary));
        settings.enable_device_management = true;
        assert!(event_allowed(&settings, &summary));
    }
}
