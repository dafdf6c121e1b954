//! Inbound command routing
//!
//! Subscribed bus traffic lands here. Device-addressed `command` and
//! `config` topics resolve to a port through the fleet actor and their
//! contents go out over the serial line. Everything else, including the
//! daemon's own outbound topics echoed back, is dropped. A command for a
//! device that is not in the registry is answered with an error on the
//! device's status topic so the sender learns the address is stale.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use wep_detect::PortTaskCommand;
use wep_fleet::FleetCommand;
use wep_protocol::{parse_inbound, topic, unix_ts, CommandPayload, InboundTopic};

use crate::transport::{publish, BusCommand, BusMessage};

async fn resolve_port(
    fleet_tx: &mpsc::Sender<FleetCommand>,
    device_id: &str,
) -> Option<mpsc::Sender<PortTaskCommand>> {
    let (tx, rx) = oneshot::channel();
    fleet_tx
        .send(FleetCommand::ResolveDevice {
            device_id: device_id.to_string(),
            response: tx,
        })
        .await
        .ok()?;
    rx.await.ok().flatten()
}

async fn report_unknown_device(bus_tx: &mpsc::Sender<BusCommand>, device_id: &str) {
    let payload = serde_json::json!({
        "device": device_id,
        "error": "unknown device",
        "ts": unix_ts(),
    });
    let body = match serde_json::to_vec(&payload) {
        Ok(body) => body,
        Err(_) => return,
    };
    if let Err(e) = publish(bus_tx, topic::status(device_id), body).await {
        debug!("Could not report unknown device {}: {}", device_id, e);
    }
}

/// Route inbound bus messages to device ports until the channel closes
pub async fn run_router(
    mut inbound_rx: mpsc::Receiver<BusMessage>,
    fleet_tx: mpsc::Sender<FleetCommand>,
    bus_tx: mpsc::Sender<BusCommand>,
) {
    info!("Command router started");
    while let Some(message) = inbound_rx.recv().await {
        let Some(inbound) = parse_inbound(&message.topic) else {
            debug!("Ignoring non-inbound topic {}", message.topic);
            continue;
        };

        match inbound {
            InboundTopic::Command { device_id } => {
                let command: CommandPayload = match serde_json::from_slice(&message.payload) {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("Malformed command for {}: {}", device_id, e);
                        continue;
                    }
                };
                let Some(port_tx) = resolve_port(&fleet_tx, &device_id).await else {
                    warn!("Command for unknown device {}", device_id);
                    report_unknown_device(&bus_tx, &device_id).await;
                    continue;
                };
                debug!("Routing command {:?} to {}", command.command, device_id);
                let data = format!("{}\n", command.command).into_bytes();
                let _ = port_tx.send(PortTaskCommand::SendData { data }).await;
            }
            InboundTopic::Config { device_id } => {
                if serde_json::from_slice::<serde_json::Value>(&message.payload).is_err() {
                    warn!("Malformed config for {}", device_id);
                    continue;
                }
                let Some(port_tx) = resolve_port(&fleet_tx, &device_id).await else {
                    warn!("Config for unknown device {}", device_id);
                    report_unknown_device(&bus_tx, &device_id).await;
                    continue;
                };
                debug!("Routing config to {}", device_id);
                let mut data = message.payload.clone();
                data.push(b'\n');
                let _ = port_tx.send(PortTaskCommand::SendData { data }).await;
            }
        }
    }
    info!("Command router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal registry double: resolves exactly one known slug
    fn fake_fleet(
        known_slug: &'static str,
    ) -> (
        mpsc::Sender<FleetCommand>,
        mpsc::Receiver<PortTaskCommand>,
    ) {
        let (fleet_tx, mut fleet_rx) = mpsc::channel(16);
        let (port_tx, port_rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(cmd) = fleet_rx.recv().await {
                if let FleetCommand::ResolveDevice {
                    device_id,
                    response,
                } = cmd
                {
                    let found = (device_id == known_slug).then(|| port_tx.clone());
                    let _ = response.send(found);
                }
            }
        });
        (fleet_tx, port_rx)
    }

    fn harness(
        known_slug: &'static str,
    ) -> (
        mpsc::Sender<BusMessage>,
        mpsc::Receiver<PortTaskCommand>,
        mpsc::Receiver<BusCommand>,
    ) {
        let (fleet_tx, port_rx) = fake_fleet(known_slug);
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (bus_tx, bus_rx) = mpsc::channel(16);
        tokio::spawn(run_router(inbound_rx, fleet_tx, bus_tx));
        (inbound_tx, port_rx, bus_rx)
    }

    #[tokio::test]
    async fn test_command_written_to_port() {
        let (inbound_tx, mut port_rx, _bus_rx) = harness("dev_ttyUSB0");
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/command".to_string(),
                payload: br#"{"command":"reset"}"#.to_vec(),
            })
            .await
            .unwrap();

        match port_rx.recv().await.unwrap() {
            PortTaskCommand::SendData { data } => assert_eq!(data, b"reset\n"),
            other => panic!("Expected SendData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_config_forwarded_verbatim() {
        let (inbound_tx, mut port_rx, _bus_rx) = harness("dev_ttyUSB0");
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/config".to_string(),
                payload: br#"{"channel":11}"#.to_vec(),
            })
            .await
            .unwrap();

        match port_rx.recv().await.unwrap() {
            PortTaskCommand::SendData { data } => {
                assert_eq!(data, b"{\"channel\":11}\n");
            }
            other => panic!("Expected SendData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_device_answered_on_status_topic() {
        let (inbound_tx, _port_rx, mut bus_rx) = harness("dev_ttyUSB0");
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyACM9/command".to_string(),
                payload: br#"{"command":"reset"}"#.to_vec(),
            })
            .await
            .unwrap();

        match bus_rx.recv().await.unwrap() {
            BusCommand::Publish { topic, payload, ack } => {
                assert_eq!(topic, "wepower_iot/dev_ttyACM9/status");
                let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(json["error"], "unknown device");
                let _ = ack.send(Ok(()));
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_command_dropped() {
        let (inbound_tx, mut port_rx, _bus_rx) = harness("dev_ttyUSB0");
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/command".to_string(),
                payload: b"not json".to_vec(),
            })
            .await
            .unwrap();
        // A valid command after the bad one proves the router kept going
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/command".to_string(),
                payload: br#"{"command":"ok"}"#.to_vec(),
            })
            .await
            .unwrap();

        match port_rx.recv().await.unwrap() {
            PortTaskCommand::SendData { data } => assert_eq!(data, b"ok\n"),
            other => panic!("Expected SendData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outbound_echo_ignored() {
        let (inbound_tx, mut port_rx, _bus_rx) = harness("dev_ttyUSB0");
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/data".to_string(),
                payload: b"{}".to_vec(),
            })
            .await
            .unwrap();
        inbound_tx
            .send(BusMessage {
                topic: "wepower_iot/dev_ttyUSB0/command".to_string(),
                payload: br#"{"command":"after"}"#.to_vec(),
            })
            .await
            .unwrap();

        match port_rx.recv().await.unwrap() {
            PortTaskCommand::SendData { data } => assert_eq!(data, b"after\n"),
            other => panic!("Expected SendData, got {:?}", other),
        }
    }
}
