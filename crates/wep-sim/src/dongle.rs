//! Virtual dongle simulation
//!
//! A scripted responder on the far end of an in-memory duplex stream. Each
//! received chunk is matched against the dongle's response rules in order;
//! the first matching rule's reply goes back over the stream. An empty
//! trigger matches anything, which is how identification banners answer
//! whatever probe arrives first.

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::debug;

/// One response rule: reply when the input contains `trigger`
#[derive(Debug, Clone)]
struct Rule {
    trigger: String,
    reply: Vec<u8>,
}

/// Handle for injecting unsolicited traffic into a running dongle
#[derive(Debug, Clone)]
pub struct DongleHandle {
    inject_tx: mpsc::Sender<Vec<u8>>,
}

impl DongleHandle {
    /// Emit bytes from the dongle as if it produced them on its own
    pub async fn emit(&self, data: &[u8]) {
        let _ = self.inject_tx.send(data.to_vec()).await;
    }
}

/// A simulated dongle that answers probe and pairing traffic
#[derive(Debug, Clone)]
pub struct VirtualDongle {
    name: String,
    rules: Vec<Rule>,
}

impl VirtualDongle {
    /// A dongle with no behavior; add rules with [`Self::with_response`]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// A BLE dongle: identification banner, pairing handshake, liveness
    pub fn ble() -> Self {
        Self::new("ble")
            .with_response("PAIR_REQUEST", b"PAIR_ACK\r\n")
            .with_response("PAIR_CONFIRM", b"PAIR_OK\r\n")
            .with_response("PING", b"PONG\r\n")
            .with_response("", b"BLE module v2.1 ready\r\n")
    }

    /// A Zigbee coordinator: banner, join handshake, liveness
    pub fn zigbee() -> Self {
        Self::new("zigbee")
            .with_response("PERMIT_JOIN", b"JOIN_ACK\r\n")
            .with_response("PAIR_CONFIRM", b"PAIR_OK\r\n")
            .with_response("PING", b"PONG\r\n")
            .with_response("", b"Zigbee coordinator EZSP v7\r\n")
    }

    /// A Z-Wave controller: banner only, no pairing
    pub fn zwave() -> Self {
        Self::new("zwave")
            .with_response("PING", b"PONG\r\n")
            .with_response("", b"Z-Wave SerialAPI controller\r\n")
    }

    /// A dongle that answers only the generic fallback probe
    pub fn generic() -> Self {
        Self::new("generic")
            .with_response("WHO_ARE_YOU", b"WePower dongle ready\r\n")
            .with_response("PING", b"PONG\r\n")
    }

    /// A dongle that never answers anything
    pub fn silent() -> Self {
        Self::new("silent")
    }

    /// Append a response rule (checked in insertion order)
    pub fn with_response(mut self, trigger: &str, reply: &[u8]) -> Self {
        self.rules.push(Rule {
            trigger: trigger.to_string(),
            reply: reply.to_vec(),
        });
        self
    }

    /// Spawn the responder, returning the near end of the stream and an
    /// injection handle
    pub fn spawn(self) -> (DuplexStream, DongleHandle) {
        let (near, far) = tokio::io::duplex(1024);
        let (inject_tx, inject_rx) = mpsc::channel(16);
        tokio::spawn(self.run(far, inject_rx));
        (near, DongleHandle { inject_tx })
    }

    async fn run(self, mut stream: DuplexStream, mut inject_rx: mpsc::Receiver<Vec<u8>>) {
        let mut buf = [0u8; 256];
        loop {
            tokio::select! {
                data = inject_rx.recv() => {
                    let Some(data) = data else { break };
                    if stream.write_all(&data).await.is_err() {
                        break;
                    }
                }
                read = stream.read(&mut buf) => {
                    let n = match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let text = String::from_utf8_lossy(&buf[..n]).to_uppercase();
                    let reply = self
                        .rules
                        .iter()
                        .find(|rule| text.contains(&rule.trigger))
                        .map(|rule| rule.reply.clone());
                    if let Some(reply) = reply {
                        debug!("Dongle {} answering {:?}", self.name, text.trim());
                        if stream.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("Dongle {} stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(stream: &mut DuplexStream, send: &[u8]) -> Vec<u8> {
        stream.write_all(send).await.unwrap();
        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn test_ble_dongle_banner_and_handshake() {
        let (mut stream, _handle) = VirtualDongle::ble().spawn();

        let banner = exchange(&mut stream, b"AT\n").await;
        assert!(String::from_utf8_lossy(&banner).contains("BLE module"));

        let ack = exchange(&mut stream, b"PAIR_REQUEST\n").await;
        assert_eq!(ack, b"PAIR_ACK\r\n");
        let ok = exchange(&mut stream, b"PAIR_CONFIRM\n").await;
        assert_eq!(ok, b"PAIR_OK\r\n");
    }

    #[tokio::test]
    async fn test_generic_dongle_only_answers_fallback_probe() {
        let (mut stream, _handle) = VirtualDongle::generic().spawn();

        stream.write_all(b"AT\n").await.unwrap();
        let reply = exchange(&mut stream, b"WHO_ARE_YOU\n").await;
        assert!(String::from_utf8_lossy(&reply).contains("dongle ready"));
    }

    #[tokio::test]
    async fn test_injected_traffic_arrives_unprompted() {
        let (mut stream, handle) = VirtualDongle::zigbee().spawn();
        handle.emit(b"sensor report 42").await;

        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"sensor report 42");
    }

    #[tokio::test]
    async fn test_silent_dongle_stays_silent() {
        let (mut stream, _handle) = VirtualDongle::silent().spawn();
        stream.write_all(b"AT\n").await.unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            stream.read(&mut buf),
        )
        .await;
        assert!(read.is_err());
    }
}
