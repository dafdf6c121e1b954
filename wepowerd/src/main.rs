//! WePower IoT Fleet Daemon
//!
//! Watches serial ports for radio dongles, identifies and pairs them,
//! tracks their health, and bridges their traffic to the message bus.

mod app;
mod settings;

use std::path::PathBuf;

use anyhow::Context;
use settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wep_sim::VirtualBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wepowerd=info,wep_protocol=info,wep_detect=info,wep_fleet=info,wep_bus=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WePower IoT fleet daemon");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("loading settings")?;
    settings.validate().context("validating settings")?;
    tracing::info!(
        "Configured for broker {} with {} include pattern(s)",
        settings.mqtt_broker,
        settings.include_patterns.len()
    );

    // The broker client lives outside this tree; the in-memory transport
    // holds the seat until one is wired in here.
    let (bus, inbound_rx) = VirtualBus::start();
    tracing::warn!(
        "No broker client configured; publishes stay in the in-memory transport"
    );

    app::run(settings, bus.command_sender(), inbound_rx).await
}
