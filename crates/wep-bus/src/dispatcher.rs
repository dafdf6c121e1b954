//! Outbound message dispatcher
//!
//! Turns fleet events into topic/payload pairs and delivers them through
//! one sender task per device. Each sender holds a bounded FIFO: when it
//! fills, the oldest queued message is dropped, so a slow or offline bus
//! costs stale messages rather than memory. Failed publishes retry with
//! exponential backoff before the message is dropped for good. Queues are
//! independent, so one wedged device never stalls another's traffic.

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use wep_fleet::{DeviceSnapshot, FleetEvent};
use wep_protocol::{
    topic, unix_ts, DataPayload, DeviceInfo, DiscoveryMetadata, DiscoveryPayload,
    HeartbeatPayload, IdentificationPayload, StatusPayload, SummaryPayload,
};

use crate::error::BusError;
use crate::transport::{publish, BusCommand};

/// Ceiling on the retry backoff
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long to wait for a transport acknowledgement before treating the
/// attempt as failed
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery tuning for the per-device sender tasks
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// FIFO capacity per device
    pub queue_size: usize,
    /// Delivery attempts before a message is dropped
    pub retry_attempts: u32,
    /// Base retry delay; doubles per failed attempt up to [`MAX_BACKOFF`]
    pub retry_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: 100,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

fn device_info(snapshot: &DeviceSnapshot) -> DeviceInfo {
    DeviceInfo {
        device_path: snapshot.path.clone(),
        device_type: snapshot.device_type,
        fingerprint: snapshot.fingerprint.clone(),
        capabilities: snapshot.capabilities.clone(),
        last_seen: snapshot.last_seen,
        is_connected: snapshot.state.is_connected(),
        pairing_status: snapshot.pairing,
        connection_quality: snapshot.quality,
    }
}

/// Map one fleet event to the bus messages it produces
pub fn event_messages(event: &FleetEvent) -> Result<Vec<(String, Vec<u8>)>, BusError> {
    let messages = match event {
        FleetEvent::Discovered { snapshot } => {
            let payload = DiscoveryPayload {
                device_path: snapshot.path.clone(),
                device_type: snapshot.device_type,
                fingerprint: snapshot.fingerprint.clone(),
                capabilities: snapshot.capabilities.clone(),
                discovered_at: snapshot.discovered_at,
                metadata: DiscoveryMetadata {
                    response_sample: snapshot.response_sample.clone(),
                    identification_time: snapshot.identification_time,
                },
            };
            vec![(
                topic::discovery(&snapshot.fingerprint),
                serde_json::to_vec(&payload)?,
            )]
        }
        FleetEvent::Identification { snapshot } => {
            let payload = IdentificationPayload {
                device: snapshot.slug.clone(),
                device_type: snapshot.device_type,
                fingerprint: snapshot.fingerprint.clone(),
                verified: snapshot.verified,
                capabilities: snapshot.capabilities.clone(),
                identification_time: snapshot.identification_time,
                ts: unix_ts(),
            };
            vec![(
                topic::identification(&snapshot.slug),
                serde_json::to_vec(&payload)?,
            )]
        }
        FleetEvent::StatusChanged { snapshot, error } => {
            let info = device_info(snapshot);
            let payload = StatusPayload {
                device: snapshot.slug.clone(),
                state: snapshot.state,
                error: error.clone(),
                ts: unix_ts(),
                device_info: info.clone(),
            };
            vec![
                (topic::status(&snapshot.slug), serde_json::to_vec(&payload)?),
                (
                    topic::registry_device_status(&snapshot.slug),
                    serde_json::to_vec(&info)?,
                ),
            ]
        }
        FleetEvent::Heartbeat { snapshot, alive } => {
            let payload = HeartbeatPayload {
                device: snapshot.slug.clone(),
                heartbeat: *alive,
                connection_quality: snapshot.quality,
                ts: unix_ts(),
            };
            vec![(
                topic::heartbeat(&snapshot.slug),
                serde_json::to_vec(&payload)?,
            )]
        }
        FleetEvent::Data { snapshot, data } => {
            let payload = DataPayload {
                device: snapshot.slug.clone(),
                data: String::from_utf8_lossy(data).into_owned(),
                ts: unix_ts(),
                device_type: snapshot.device_type,
                fingerprint: snapshot.fingerprint.clone(),
            };
            vec![(topic::data(&snapshot.slug), serde_json::to_vec(&payload)?)]
        }
        FleetEvent::Summary { summary } => {
            let payload = SummaryPayload {
                total_devices: summary.total_devices,
                device_types: summary.device_types.clone(),
                status_counts: summary.status_counts.clone(),
                pairing_status_counts: summary.pairing_status_counts.clone(),
                ts: unix_ts(),
            };
            vec![(topic::registry_summary(), serde_json::to_vec(&payload)?)]
        }
    };
    Ok(messages)
}

fn backoff(base: Duration, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp).min(MAX_BACKOFF)
}

/// Admit one message to a sender's FIFO, evicting the oldest on overflow
///
/// Returns true when the head was evicted.
fn admit(
    label: &str,
    queue: &mut VecDeque<(String, Vec<u8>)>,
    capacity: usize,
    msg: (String, Vec<u8>),
) -> bool {
    let mut evicted = false;
    if queue.len() >= capacity {
        if let Some((topic, _)) = queue.pop_front() {
            warn!("Queue full for {}; dropping oldest message ({})", label, topic);
            evicted = true;
        }
    }
    queue.push_back(msg);
    evicted
}

async fn attempt_publish(
    bus_tx: &mpsc::Sender<BusCommand>,
    topic: String,
    payload: Vec<u8>,
) -> Result<(), BusError> {
    match timeout(ACK_TIMEOUT, publish(bus_tx, topic.clone(), payload)).await {
        Ok(result) => result,
        Err(_) => Err(BusError::PublishFailed {
            topic,
            reason: "acknowledgement timed out".to_string(),
        }),
    }
}

/// One device's sender: a bounded FIFO drained toward the transport
///
/// The head entry stays in the queue while it is being retried, so it is
/// still the oldest message and the first to go when the queue overflows.
/// Admission keeps running while a publish is in flight; a wedged bus
/// costs this device its stale messages, never the other senders their
/// throughput.
async fn run_device_sender(
    label: String,
    mut rx: mpsc::Receiver<(String, Vec<u8>)>,
    bus_tx: mpsc::Sender<BusCommand>,
    config: DispatcherConfig,
) {
    let mut queue: VecDeque<(String, Vec<u8>)> = VecDeque::new();
    let mut failures: u32 = 0;
    let mut next_try = Instant::now();
    let mut closed = false;

    loop {
        if closed && queue.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            msg = rx.recv(), if !closed => {
                match msg {
                    Some(msg) => {
                        if admit(&label, &mut queue, config.queue_size, msg) {
                            // The dropped head may have been mid-retry
                            failures = 0;
                            next_try = Instant::now();
                        }
                    }
                    None => closed = true,
                }
            }

            _ = sleep_until(next_try), if !queue.is_empty() => {
                let Some((topic, payload)) = queue.front().cloned() else {
                    continue;
                };
                let attempt = attempt_publish(&bus_tx, topic.clone(), payload);
                tokio::pin!(attempt);
                let outcome = loop {
                    tokio::select! {
                        biased;

                        msg = rx.recv(), if !closed => {
                            match msg {
                                Some(msg) => {
                                    if admit(&label, &mut queue, config.queue_size, msg) {
                                        // The in-flight head was evicted;
                                        // abandon its attempt
                                        break None;
                                    }
                                }
                                None => closed = true,
                            }
                        }

                        result = &mut attempt => break Some(result),
                    }
                };
                match outcome {
                    None => {
                        failures = 0;
                        next_try = Instant::now();
                    }
                    Some(Ok(())) => {
                        debug!("Published {}", topic);
                        queue.pop_front();
                        failures = 0;
                        next_try = Instant::now();
                    }
                    Some(Err(e)) => {
                        failures += 1;
                        if failures >= config.retry_attempts {
                            warn!(
                                "Dropping message for {} after {} attempts: {}",
                                topic, failures, e
                            );
                            queue.pop_front();
                            failures = 0;
                            next_try = Instant::now();
                        } else {
                            let delay = backoff(config.retry_delay, failures);
                            debug!("Publish to {} failed ({}); retrying in {:?}", topic, e, delay);
                            next_try = Instant::now() + delay;
                        }
                    }
                }
            }
        }
    }
    debug!("Sender for {} drained", label);
}

/// Run the dispatcher until the event channel closes
///
/// Sender tasks are created lazily per device (registry-wide events share
/// one under the `registry` label) and drained before this returns, so
/// shutdown flushes whatever the bus will still accept.
pub async fn run_dispatcher(
    mut event_rx: mpsc::Receiver<FleetEvent>,
    bus_tx: mpsc::Sender<BusCommand>,
    config: DispatcherConfig,
) {
    let mut queues: HashMap<String, mpsc::Sender<(String, Vec<u8>)>> = HashMap::new();
    let mut senders = Vec::new();

    info!("Dispatcher started");
    while let Some(event) = event_rx.recv().await {
        let messages = match event_messages(&event) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Skipping undeliverable event: {}", e);
                continue;
            }
        };
        let key = event.device_path().unwrap_or("registry").to_string();
        let queue_tx = queues.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(32);
            senders.push(tokio::spawn(run_device_sender(
                key,
                rx,
                bus_tx.clone(),
                config.clone(),
            )));
            tx
        });
        for message in messages {
            if queue_tx.send(message).await.is_err() {
                break;
            }
        }
    }

    debug!("Event channel closed; draining sender queues");
    drop(queues);
    for sender in senders {
        let _ = sender.await;
    }
    info!("Dispatcher stopped");
}
