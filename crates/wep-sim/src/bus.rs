//! In-memory bus transport
//!
//! Implements the transport side of the bus channel contract: publishes
//! are recorded and acknowledged while the bus is online, and rejected
//! while it is offline. Tests flip the online flag to exercise retry and
//! drop behavior, and inject inbound messages to exercise the router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use wep_bus::{BusCommand, BusError, BusMessage};

/// A controllable in-memory stand-in for the bus transport
#[derive(Debug, Clone)]
pub struct VirtualBus {
    cmd_tx: mpsc::Sender<BusCommand>,
    inbound_tx: mpsc::Sender<BusMessage>,
    published: Arc<Mutex<Vec<BusMessage>>>,
    online: Arc<AtomicBool>,
}

impl VirtualBus {
    /// Start the transport task; the returned receiver is the inbound
    /// subscription feed for the router
    pub fn start() -> (Self, mpsc::Receiver<BusMessage>) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<BusCommand>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let published = Arc::new(Mutex::new(Vec::new()));
        let online = Arc::new(AtomicBool::new(true));

        let task_published = Arc::clone(&published);
        let task_online = Arc::clone(&online);
        tokio::spawn(async move {
            while let Some(BusCommand::Publish { topic, payload, ack }) = cmd_rx.recv().await {
                let result = if task_online.load(Ordering::SeqCst) {
                    debug!("Virtual bus accepted {}", topic);
                    if let Ok(mut published) = task_published.lock() {
                        published.push(BusMessage { topic, payload });
                    }
                    Ok(())
                } else {
                    Err(BusError::PublishFailed {
                        topic,
                        reason: "virtual bus offline".to_string(),
                    })
                };
                let _ = ack.send(result);
            }
        });

        (
            Self {
                cmd_tx,
                inbound_tx,
                published,
                online,
            },
            inbound_rx,
        )
    }

    /// Sender half of the transport contract, for dispatcher and router
    pub fn command_sender(&self) -> mpsc::Sender<BusCommand> {
        self.cmd_tx.clone()
    }

    /// Bring the bus up or down
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Deliver a message on a subscribed topic
    pub async fn inject(&self, topic: &str, payload: &[u8]) {
        let _ = self
            .inbound_tx
            .send(BusMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            })
            .await;
    }

    /// All successfully published messages, in order
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Successfully published messages on one topic
    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }
}
