//! Library surface for the SensorPush collection daemon. `main.rs` wires
//! these modules into a binary; integration tests exercise them directly.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod model;
pub mod record;
pub mod units;
pub mod vendor;
pub mod watchdog;
pub mod window;
pub mod writer;
