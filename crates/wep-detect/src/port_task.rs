//! Per-port polling task
//!
//! Each open serial port gets one task that owns the stream exclusively:
//! it runs identification first, then polls for traffic at the configured
//! cadence, forwards raw frames upward, accepts write requests from the
//! command router and pairing/heartbeat logic, and reports port loss.
//! Suspension on a slow port never blocks any other port's task.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::DetectError;
use crate::probe::{Classification, DongleProber, ProbeConfig};

/// Commands that can be sent to a port task
#[derive(Debug)]
pub enum PortTaskCommand {
    /// Write raw bytes to the port (commands, pairing steps, liveness probes)
    SendData { data: Vec<u8> },
    /// Re-run identification (a dormant device started talking again)
    Reidentify,
    /// Shutdown the task
    Shutdown,
}

/// Events emitted by a port task
#[derive(Debug)]
pub enum PortEvent {
    /// Port opened; carries the sender for writes back to this port
    Opened {
        path: String,
        cmd_tx: mpsc::Sender<PortTaskCommand>,
    },
    /// Identification started on this port
    Identifying { path: String },
    /// Identification finished
    Identified {
        path: String,
        classification: Classification,
    },
    /// Raw bytes read from the port
    Data { path: String, data: Vec<u8> },
    /// Port is gone (unplugged, I/O failure, or shutdown)
    Lost { path: String },
}

/// A polling task bound to one serial port
pub struct PortTask<S> {
    path: String,
    stream: S,
    scan_interval: Duration,
    probe_config: ProbeConfig,
    detection_enabled: bool,
    events: mpsc::Sender<PortEvent>,
}

impl PortTask<tokio_serial::SerialStream> {
    /// Open a serial port and build its task
    pub fn open(
        path: &str,
        baud_rate: u32,
        scan_interval: Duration,
        probe_config: ProbeConfig,
        detection_enabled: bool,
        events: mpsc::Sender<PortEvent>,
    ) -> Result<Self, DetectError> {
        let stream = tokio_serial::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| DetectError::OpenFailed {
                port: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::with_stream(
            path,
            stream,
            scan_interval,
            probe_config,
            detection_enabled,
            events,
        ))
    }
}

impl<S> PortTask<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Build a task around an already-open stream (tests, simulation)
    pub fn with_stream(
        path: &str,
        stream: S,
        scan_interval: Duration,
        probe_config: ProbeConfig,
        detection_enabled: bool,
        events: mpsc::Sender<PortEvent>,
    ) -> Self {
        Self {
            path: path.to_string(),
            stream,
            scan_interval,
            probe_config,
            detection_enabled,
            events,
        }
    }

    /// Run identification and emit the result
    ///
    /// With detection disabled the dongle is taken at face value: an
    /// unverified Generic classification without any probe traffic.
    async fn identify(&mut self) -> Result<(), DetectError> {
        let _ = self
            .events
            .send(PortEvent::Identifying {
                path: self.path.clone(),
            })
            .await;

        let classification = if self.detection_enabled {
            let prober = DongleProber::with_config(self.probe_config.clone());
            prober.identify(&self.path, &mut self.stream).await?
        } else {
            debug!("Detection disabled; treating {} as generic", self.path);
            DongleProber::with_config(ProbeConfig {
                identification_timeout: Duration::ZERO,
                ..self.probe_config.clone()
            })
            .identify(&self.path, &mut self.stream)
            .await?
        };

        let _ = self
            .events
            .send(PortEvent::Identified {
                path: self.path.clone(),
                classification,
            })
            .await;
        Ok(())
    }

    /// Main loop - identify, then poll until failure or shutdown
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<PortTaskCommand>) {
        info!("Starting polling task for {}", self.path);

        if let Err(e) = self.identify().await {
            warn!("Identification failed on {}: {}", self.path, e);
            let _ = self
                .events
                .send(PortEvent::Lost {
                    path: self.path.clone(),
                })
                .await;
            return;
        }

        let mut buffer = vec![0u8; 1024];

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(PortTaskCommand::SendData { data }) => {
                            if let Err(e) = self.write(&data).await {
                                warn!("Write error on {}: {}", self.path, e);
                                break;
                            }
                        }
                        Some(PortTaskCommand::Reidentify) => {
                            debug!("Re-identifying {}", self.path);
                            if self.identify().await.is_err() {
                                break;
                            }
                        }
                        Some(PortTaskCommand::Shutdown) | None => {
                            info!("Shutdown requested for {}", self.path);
                            break;
                        }
                    }
                }

                result = tokio::time::timeout(
                    self.scan_interval,
                    self.stream.read(&mut buffer)
                ) => {
                    match result {
                        Ok(Ok(n)) if n > 0 => {
                            let data = buffer[..n].to_vec();
                            debug!("Read {} bytes from {}", n, self.path);
                            let _ = self.events.send(PortEvent::Data {
                                path: self.path.clone(),
                                data,
                            }).await;
                        }
                        Ok(Ok(_)) => {
                            // EOF: the device side went away
                            warn!("Port {} closed", self.path);
                            break;
                        }
                        Ok(Err(e)) => {
                            warn!("Read error on {}: {}", self.path, e);
                            break;
                        }
                        Err(_) => {} // poll cadence elapsed without traffic
                    }
                }
            }
        }

        info!("Polling task ended for {}", self.path);
        let _ = self
            .events
            .send(PortEvent::Lost {
                path: self.path.clone(),
            })
            .await;
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }
}

/// Spawn a port task, returning the command sender for writes to it
///
/// The task announces itself with [`PortEvent::Opened`] before any probe
/// traffic so the registry can create the device entry first.
pub async fn spawn_port_task<S>(task: PortTask<S>) -> mpsc::Sender<PortTaskCommand>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let _ = task
        .events
        .send(PortEvent::Opened {
            path: task.path.clone(),
            cmd_tx: cmd_tx.clone(),
        })
        .await;
    tokio::spawn(task.run(cmd_rx));
    cmd_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use wep_protocol::DeviceType;

    fn probe_config() -> ProbeConfig {
        ProbeConfig {
            identification_timeout: Duration::from_millis(500),
            inter_probe_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_port_task_identifies_then_forwards_data() {
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let (near, mut far) = tokio::io::duplex(1024);

        // Far end: answer the first probe, then emit organic traffic
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = far.read(&mut buf).await;
            let _ = far.write_all(b"BLE module ready").await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = far.write_all(b"ADV:0102").await;
            // Hold the stream open until the test is done
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let task = PortTask::with_stream(
            "/dev/ttyTEST",
            near,
            Duration::from_millis(20),
            probe_config(),
            true,
            events_tx,
        );
        let cmd_tx = spawn_port_task(task).await;

        match events_rx.recv().await.unwrap() {
            PortEvent::Opened { path, .. } => assert_eq!(path, "/dev/ttyTEST"),
            other => panic!("Expected Opened, got {:?}", other),
        }
        assert!(matches!(
            events_rx.recv().await.unwrap(),
            PortEvent::Identifying { .. }
        ));
        match events_rx.recv().await.unwrap() {
            PortEvent::Identified { classification, .. } => {
                assert_eq!(classification.device_type, DeviceType::Ble);
                assert!(classification.verified);
            }
            other => panic!("Expected Identified, got {:?}", other),
        }
        match events_rx.recv().await.unwrap() {
            PortEvent::Data { data, .. } => assert_eq!(data, b"ADV:0102"),
            other => panic!("Expected Data, got {:?}", other),
        }

        cmd_tx.send(PortTaskCommand::Shutdown).await.unwrap();
        loop {
            match events_rx.recv().await.unwrap() {
                PortEvent::Lost { path } => {
                    assert_eq!(path, "/dev/ttyTEST");
                    break;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_port_task_reports_loss_on_eof() {
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let (near, mut far) = tokio::io::duplex(1024);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = far.read(&mut buf).await;
            let _ = far.write_all(b"zigbee coordinator").await;
            // Drop the far end: the task must observe EOF and report loss
        });

        let task = PortTask::with_stream(
            "/dev/ttyGONE",
            near,
            Duration::from_millis(20),
            probe_config(),
            true,
            events_tx,
        );
        let _cmd_tx = spawn_port_task(task).await;

        let mut lost = false;
        while let Some(event) = events_rx.recv().await {
            if matches!(event, PortEvent::Lost { .. }) {
                lost = true;
                break;
            }
        }
        assert!(lost);
    }
}
