//! WePower IoT Fleet Engine
//!
//! The device registry is the single source of truth for every dongle's
//! lifecycle: connection state, identification result, pairing status, and
//! heartbeat-derived connection quality. All mutation goes through one actor
//! task that owns the registry, so concurrent classification, heartbeat, and
//! pairing updates for the same device are serialized by construction while
//! different devices never contend.
//!
//! # Architecture
//!
//! The actor receives [`FleetCommand`]s (port lifecycle, traffic, queries)
//! and emits [`FleetEvent`]s consumed by the message dispatcher. Periodic
//! heartbeat and pairing-timeout sweeps run on timers inside the actor.

pub mod actor;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod pairing;
pub mod registry;
pub mod state;

pub use actor::{run_fleet_actor, FleetCommand, FleetConfig};
pub use error::FleetError;
pub use events::FleetEvent;
pub use heartbeat::{update_quality, EMA_ALPHA, LIVENESS_PROBE};
pub use pairing::{PairingSession, SessionProgress};
pub use registry::{ActivityOutcome, DeviceRegistry};
pub use state::{DeviceEntry, DeviceSnapshot, RegistrySummary};
