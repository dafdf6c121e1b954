//! Dongle identification engine
//!
//! Runs the "who are you?" protocol against a port that has started
//! producing bytes: walk the identification table in priority order, send
//! each row's candidate commands, and test the accumulated response buffer
//! against every row's patterns. The whole run is bounded by the
//! identification timeout; exhaustion falls back to a Generic, unverified
//! classification.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use wep_protocol::{
    classify_response, fingerprint, spec_for, total_probe_commands, DeviceType, DEVICE_TABLE,
};

use crate::error::DetectError;

/// Cap on the response sample carried into discovery metadata
const RESPONSE_SAMPLE_LIMIT: usize = 128;

/// Result of identifying a dongle
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Detected device type (Generic when nothing matched)
    pub device_type: DeviceType,
    /// 8-hex digest of the classifying response bytes
    pub fingerprint: String,
    /// Capabilities from the identification table
    pub capabilities: Vec<String>,
    /// False when the device fell through to the Generic fallback
    pub verified: bool,
    /// Sample of the response bytes that drove classification
    pub response_sample: Vec<u8>,
    /// How long the identification run took
    pub identification_time: Duration,
}

impl Classification {
    /// Whether this device type supports the pairing handshake
    pub fn pairing_capable(&self) -> bool {
        spec_for(self.device_type).is_some_and(|s| s.pairing_capable)
    }
}

/// Configuration for identification runs
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Overall budget for one identification run
    pub identification_timeout: Duration,
    /// Settle delay between probe commands
    pub inter_probe_delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            identification_timeout: Duration::from_secs(5),
            inter_probe_delay: Duration::from_millis(50),
        }
    }
}

/// Dongle identification prober
pub struct DongleProber {
    config: ProbeConfig,
}

impl DongleProber {
    /// Create a prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Identify the dongle behind a stream
    ///
    /// Always produces a classification: a pattern match yields a verified
    /// result, exhaustion or timeout yields the Generic fallback. Only a
    /// transport-level I/O failure is an error.
    pub async fn identify<S>(&self, port: &str, stream: &mut S) -> Result<Classification, DetectError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let deadline = started + self.config.identification_timeout;
        // Each command gets an equal slice of the overall budget
        let slice = self.config.identification_timeout / total_probe_commands() as u32;

        let mut buffer: Vec<u8> = Vec::new();

        'table: for spec in DEVICE_TABLE {
            debug!("Probing {} for {}...", port, spec.device_type);
            for command in spec.commands {
                let now = Instant::now();
                if now >= deadline {
                    debug!("Identification budget exhausted on {}", port);
                    break 'table;
                }

                trace!("Sending {:?} probe to {}", command, port);
                let wire = format!("{command}\n");
                stream
                    .write_all(wire.as_bytes())
                    .await
                    .map_err(|e| io_err(port, e))?;
                stream.flush().await.map_err(|e| io_err(port, e))?;

                let read_budget = slice.min(deadline - now);
                let mut chunk = [0u8; 256];
                match timeout(read_budget, stream.read(&mut chunk)).await {
                    Ok(Ok(n)) if n > 0 => {
                        trace!(
                            "{} responded: {:?}",
                            port,
                            String::from_utf8_lossy(&chunk[..n])
                        );
                        buffer.extend_from_slice(&chunk[..n]);
                        // Test against the whole table so priority order, not
                        // arrival time, resolves multi-type matches
                        if let Some(matched) = classify_response(&buffer) {
                            return Ok(self.classified(matched.device_type, &buffer, started));
                        }
                    }
                    Ok(Ok(_)) => {
                        // 0 bytes: stream closed; fall back rather than spin
                        debug!("Stream closed while probing {}", port);
                        break 'table;
                    }
                    Ok(Err(e)) => {
                        warn!("Read error while probing {}: {}", port, e);
                        return Err(io_err(port, e));
                    }
                    Err(_) => trace!("No response to {:?} on {}", command, port),
                }

                tokio::time::sleep(self.config.inter_probe_delay).await;
            }
        }

        debug!("No banner match on {}; classifying as generic", port);
        Ok(self.fallback(&buffer, started))
    }

    fn classified(
        &self,
        device_type: DeviceType,
        response: &[u8],
        started: Instant,
    ) -> Classification {
        let spec = spec_for(device_type);
        let capabilities = spec
            .map(|s| s.capabilities.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        let classification = Classification {
            device_type,
            fingerprint: fingerprint(response),
            capabilities,
            verified: true,
            response_sample: sample(response),
            identification_time: started.elapsed(),
        };
        info!(
            "Identified {} dongle (fingerprint {}) in {:.2}s",
            device_type,
            classification.fingerprint,
            classification.identification_time.as_secs_f64()
        );
        classification
    }

    fn fallback(&self, response: &[u8], started: Instant) -> Classification {
        let capabilities = spec_for(DeviceType::Generic)
            .map(|s| s.capabilities.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        Classification {
            device_type: DeviceType::Generic,
            fingerprint: fingerprint(response),
            capabilities,
            verified: false,
            response_sample: sample(response),
            identification_time: started.elapsed(),
        }
    }
}

impl Default for DongleProber {
    fn default() -> Self {
        Self::new()
    }
}

fn io_err(port: &str, source: std::io::Error) -> DetectError {
    DetectError::Io {
        port: port.to_string(),
        source,
    }
}

fn sample(response: &[u8]) -> Vec<u8> {
    response[..response.len().min(RESPONSE_SAMPLE_LIMIT)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.identification_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_silent_stream_falls_back_to_generic() {
        tokio::time::pause();
        let prober = DongleProber::with_config(ProbeConfig {
            identification_timeout: Duration::from_secs(5),
            inter_probe_delay: Duration::from_millis(10),
        });

        // Keep the far end open but never respond
        let (mut near, _far) = tokio::io::duplex(1024);
        let handle = tokio::spawn(async move {
            prober.identify("/dev/ttyTEST", &mut near).await.unwrap()
        });

        tokio::time::advance(Duration::from_secs(6)).await;
        let classification = handle.await.unwrap();

        assert_eq!(classification.device_type, DeviceType::Generic);
        assert!(!classification.verified);
        assert_eq!(
            classification.capabilities,
            vec!["serial_communication", "basic_at_commands"]
        );
    }

    #[tokio::test]
    async fn test_identification_is_deterministic_for_fixed_response() {
        let run = || async {
            let (mut near, mut far) = tokio::io::duplex(1024);
            tokio::spawn(async move {
                let mut buf = [0u8; 64];
                // Reply to the first probe command with a fixed banner
                let _ = far.read(&mut buf).await;
                let _ = far.write_all(b"ZIGBEE COORDINATOR v1").await;
            });
            DongleProber::new()
                .identify("/dev/ttyTEST", &mut near)
                .await
                .unwrap()
        };

        let a = run().await;
        let b = run().await;
        assert_eq!(a.device_type, DeviceType::Zigbee);
        assert_eq!(a.device_type, b.device_type);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
