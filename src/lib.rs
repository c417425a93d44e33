//! WeatherNode firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod ble;
pub mod config;
pub mod delay;
pub mod error;
pub mod i2c;
pub mod sensors;

pub use error::{Error, Result};
