//! WePower IoT Simulation Layer
//!
//! Test doubles for the two hardware boundaries: [`VirtualDongle`] stands
//! in for a radio dongle on a serial port, and [`VirtualBus`] stands in for
//! the message bus transport. Both speak the real contracts, so everything
//! between the boundaries runs unchanged.

pub mod bus;
pub mod dongle;

pub use bus::VirtualBus;
pub use dongle::{DongleHandle, VirtualDongle};
