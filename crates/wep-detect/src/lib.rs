//! WePower IoT Port Detection Library
//!
//! This crate provides serial port enumeration with include/exclude glob
//! filtering, the probe/classify identification engine, and the per-port
//! polling task that feeds raw dongle traffic to the rest of the system.
//!
//! # Example
//!
//! ```rust,no_run
//! use wep_detect::{PortScanner, ScannerConfig};
//!
//! let config = ScannerConfig {
//!     include_patterns: vec!["/dev/ttyUSB*".to_string()],
//!     exclude_patterns: vec!["/dev/ttyS*".to_string()],
//! };
//! let scanner = PortScanner::new(&config).unwrap();
//! for port in scanner.enumerate().unwrap() {
//!     println!("Found candidate port: {}", port);
//! }
//! ```

pub mod error;
pub mod port_task;
pub mod probe;
pub mod scanner;

pub use error::DetectError;
pub use port_task::{spawn_port_task, PortEvent, PortTask, PortTaskCommand};
pub use probe::{Classification, DongleProber, ProbeConfig};
pub use scanner::{PortScanner, ScannerConfig};
