//! Channel contract between the bus layer and the transport
//!
//! The daemon never talks to a broker client directly. Publishes go out as
//! [`BusCommand`]s carrying an acknowledgement channel; subscribed traffic
//! comes back as [`BusMessage`]s. The ack is what makes retry possible:
//! the dispatcher knows whether each delivery landed.

use tokio::sync::{mpsc, oneshot};

use crate::error::BusError;

/// A message received from a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Commands sent to the transport task
#[derive(Debug)]
pub enum BusCommand {
    /// Publish a payload, acknowledging the outcome on `ack`
    Publish {
        topic: String,
        payload: Vec<u8>,
        ack: oneshot::Sender<Result<(), BusError>>,
    },
}

/// Publish one message and wait for the transport's acknowledgement
pub async fn publish(
    bus_tx: &mpsc::Sender<BusCommand>,
    topic: String,
    payload: Vec<u8>,
) -> Result<(), BusError> {
    let (ack_tx, ack_rx) = oneshot::channel();
    bus_tx
        .send(BusCommand::Publish {
            topic,
            payload,
            ack: ack_tx,
        })
        .await
        .map_err(|_| BusError::Offline)?;
    ack_rx.await.map_err(|_| BusError::Offline)?
}
