//! Pairing handshake sessions
//!
//! A session walks the device type's handshake table one step at a time:
//! send the step's command, wait for a response containing the expected
//! acknowledgement, advance. Unmatched traffic during pairing is ordinary
//! device data and leaves the session untouched. Sessions that outlive the
//! pairing timeout fail.

use tokio::time::{Duration, Instant};

use wep_protocol::HandshakeStep;

/// Outcome of feeding one response frame into a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionProgress {
    /// Acknowledgement matched; `command` is the next step to send
    Advanced { command: &'static str },
    /// Final acknowledgement matched; handshake is done
    Completed,
    /// Frame did not acknowledge the pending step
    NoMatch,
}

/// An in-flight pairing handshake for one device
#[derive(Debug)]
pub struct PairingSession {
    handshake: &'static [HandshakeStep],
    step: usize,
    deadline: Instant,
}

impl PairingSession {
    /// Start a session over the given handshake steps
    ///
    /// Returns `None` for an empty handshake; there is nothing to pair.
    pub fn start(handshake: &'static [HandshakeStep], timeout: Duration) -> Option<Self> {
        if handshake.is_empty() {
            return None;
        }
        Some(Self {
            handshake,
            step: 0,
            deadline: Instant::now() + timeout,
        })
    }

    /// Command to send for the current step
    pub fn current_command(&self) -> &'static str {
        self.handshake[self.step].command
    }

    /// Feed a response frame into the session
    pub fn observe(&mut self, data: &[u8]) -> SessionProgress {
        let text = String::from_utf8_lossy(data).to_lowercase();
        let expect = self.handshake[self.step].expect.to_lowercase();
        if !text.contains(&expect) {
            return SessionProgress::NoMatch;
        }
        self.step += 1;
        if self.step == self.handshake.len() {
            SessionProgress::Completed
        } else {
            SessionProgress::Advanced {
                command: self.handshake[self.step].command,
            }
        }
    }

    /// Whether the session passed its deadline
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wep_protocol::{spec_for, DeviceType};

    fn ble_session() -> PairingSession {
        let spec = spec_for(DeviceType::Ble).unwrap();
        PairingSession::start(spec.handshake, Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_full_ble_handshake() {
        let mut session = ble_session();
        assert_eq!(session.current_command(), "PAIR_REQUEST");

        assert_eq!(
            session.observe(b"PAIR_ACK\r\n"),
            SessionProgress::Advanced {
                command: "PAIR_CONFIRM"
            }
        );
        assert_eq!(session.observe(b"pair_ok"), SessionProgress::Completed);
    }

    #[test]
    fn test_unrelated_traffic_does_not_advance() {
        let mut session = ble_session();
        assert_eq!(session.observe(b"ADV:0102"), SessionProgress::NoMatch);
        assert_eq!(session.current_command(), "PAIR_REQUEST");
    }

    #[test]
    fn test_zigbee_handshake_order() {
        let spec = spec_for(DeviceType::Zigbee).unwrap();
        let mut session =
            PairingSession::start(spec.handshake, Duration::from_secs(30)).unwrap();
        assert_eq!(session.current_command(), "PERMIT_JOIN");
        assert_eq!(
            session.observe(b"JOIN_ACK"),
            SessionProgress::Advanced {
                command: "PAIR_CONFIRM"
            }
        );
    }

    #[test]
    fn test_empty_handshake_yields_no_session() {
        let spec = spec_for(DeviceType::Generic).unwrap();
        assert!(PairingSession::start(spec.handshake, Duration::from_secs(30)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry() {
        let session = ble_session();
        assert!(!session.expired(Instant::now()));
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(session.expired(Instant::now()));
    }
}
