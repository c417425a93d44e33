//! Application core: sampling and publication, no direct I/O.
//!
//! Sensors and the BLE server are reached only through the port traits in
//! [`ports`], so the whole layer runs on the host against fakes.

pub mod poller;
pub mod ports;
pub mod state;

pub use poller::SensorPoller;
pub use state::{EnvironmentReadings, SharedReadings};
