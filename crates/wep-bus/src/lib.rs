//! WePower IoT Bus Layer
//!
//! Sits between the fleet actor and the message bus transport. Outbound,
//! the dispatcher turns [`wep_fleet::FleetEvent`]s into topic/payload pairs
//! and delivers them through per-device bounded queues with retry and
//! exponential backoff. Inbound, the router parses device-addressed
//! command and config topics and writes their contents to the matching
//! serial port.
//!
//! The transport itself is a channel contract ([`BusCommand`] out,
//! [`BusMessage`] in), so any broker client or in-memory double can sit on
//! the other end.

pub mod dispatcher;
pub mod error;
pub mod router;
pub mod transport;

pub use dispatcher::{event_messages, run_dispatcher, DispatcherConfig, MAX_BACKOFF};
pub use error::BusError;
pub use router::run_router;
pub use transport::{publish, BusCommand, BusMessage};
