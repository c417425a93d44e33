//! Port traits: the boundary between the poll loop and the outside world.
//!
//! ```text
//!   LightSensorPort ──┐
//!                     ├──▶ SensorPoller ──▶ ValueSink (GATT server)
//!   ClimateSensorPort ┘
//! ```
//!
//! The sensor drivers and the GATT server implement these traits; the
//! poller consumes them via generics so it can be exercised with fakes.

use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::ble::{BleUuid, UpdateOutcome};
use crate::i2c::I2cTransport;
use crate::sensors::aht20::{Aht20, Aht20Data, Aht20Error};
use crate::sensors::ltr390::{Ltr390, Ltr390Error};

// ───────────────────────────────────────────────────────────────
// Sensor ports (driven adapter: hardware → poller)
// ───────────────────────────────────────────────────────────────

/// Ambient light / UV sensor with two exclusive measurement modes.
pub trait LightSensorPort {
    fn enter_als_mode(&mut self) -> Result<(), Ltr390Error>;
    fn enter_uv_mode(&mut self) -> Result<(), Ltr390Error>;
    fn luminosity(&mut self) -> Result<f64, Ltr390Error>;
    fn uv_index(&mut self) -> Result<f64, Ltr390Error>;
}

/// Temperature / humidity sensor.
pub trait ClimateSensorPort {
    /// Trigger a measurement and wait for the result.
    fn measure(&mut self) -> Result<Aht20Data, Aht20Error>;
}

impl<T: I2cTransport> LightSensorPort for Ltr390<T> {
    fn enter_als_mode(&mut self) -> Result<(), Ltr390Error> {
        self.setup_in_als_mode()
    }

    fn enter_uv_mode(&mut self) -> Result<(), Ltr390Error> {
        self.setup_in_uv_mode()
    }

    fn luminosity(&mut self) -> Result<f64, Ltr390Error> {
        self.read_luminosity()
    }

    fn uv_index(&mut self) -> Result<f64, Ltr390Error> {
        self.read_uv_index()
    }
}

impl<T: I2cTransport, D: DelayNs> ClimateSensorPort for Aht20<T, D> {
    fn measure(&mut self) -> Result<Aht20Data, Aht20Error> {
        self.read_data(true)
    }
}

// ───────────────────────────────────────────────────────────────
// Value sink (driven adapter: poller → BLE)
// ───────────────────────────────────────────────────────────────

/// Receives encoded characteristic values.
pub trait ValueSink {
    fn publish(&mut self, characteristic: &BleUuid, service: &BleUuid, value: &[u8]) -> UpdateOutcome;
}

/// A sink shared with the BLE callback context.
impl<T: ValueSink + ?Sized> ValueSink for Arc<Mutex<T>> {
    fn publish(&mut self, characteristic: &BleUuid, service: &BleUuid, value: &[u8]) -> UpdateOutcome {
        match self.lock() {
            Ok(mut sink) => sink.publish(characteristic, service, value),
            Err(_) => {
                warn!("BLE: value sink lock poisoned, dropping update for {}", characteristic);
                UpdateOutcome::Unknown
            }
        }
    }
}
