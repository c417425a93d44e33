//! Latest sensor readings, shared between the poll loop and BLE reads.
//!
//! ## Wire encoding
//!
//! Every characteristic value is a signed 32-bit integer, little-endian.
//!
//! | Characteristic | Unit        | Example            |
//! |----------------|-------------|--------------------|
//! | `0xFF01`       | lux         | 523 lx → `0B 02 00 00` |
//! | `0xFF02`       | UVI × 100   | 3.27 → `47 01 00 00`   |
//! | `0xFF03`       | °C × 100    | -4.5 → `3E FE FF FF`   |
//! | `0xFF04`       | %RH × 100   | 41.2 → `18 10 00 00`   |

use core::cell::Cell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::ble::BleUuid;
use crate::ble::profile::{
    CHAR_AMBIENT_LIGHT, CHAR_HUMIDITY, CHAR_TEMPERATURE, CHAR_UV_INDEX, SERVICE_UUID,
};
use crate::ble::server::ValueProducer;

/// `None` until the first successful read of that quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentReadings {
    pub lux: Option<f64>,
    pub uv_index: Option<f64>,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

/// Scale, round and saturate to an i32, little-endian.
pub fn encode_scaled(value: f64, scale: f64) -> [u8; 4] {
    ((value * scale).round() as i32).to_le_bytes()
}

impl EnvironmentReadings {
    /// Wire value for `characteristic`, if it is one of ours and has a reading.
    pub fn encode_for(&self, characteristic: &BleUuid) -> Option<[u8; 4]> {
        let (value, scale) = match *characteristic {
            CHAR_AMBIENT_LIGHT => (self.lux?, 1.0),
            CHAR_UV_INDEX => (self.uv_index?, 100.0),
            CHAR_TEMPERATURE => (self.temperature_c?, 100.0),
            CHAR_HUMIDITY => (self.humidity_pct?, 100.0),
            _ => return None,
        };
        Some(encode_scaled(value, scale))
    }
}

/// Owned handle to the latest readings.  Clones share the same cell.
#[derive(Clone)]
pub struct SharedReadings {
    cell: Arc<Mutex<CriticalSectionRawMutex, Cell<EnvironmentReadings>>>,
}

impl Default for SharedReadings {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedReadings {
    pub fn new() -> Self {
        Self { cell: Arc::new(Mutex::new(Cell::new(EnvironmentReadings::default()))) }
    }

    pub fn get(&self) -> EnvironmentReadings {
        self.cell.lock(Cell::get)
    }

    pub fn set(&self, readings: EnvironmentReadings) {
        self.cell.lock(|c| c.set(readings));
    }

    /// Read-modify-write under one lock.
    pub fn update(&self, f: impl FnOnce(&mut EnvironmentReadings)) -> EnvironmentReadings {
        self.cell.lock(|c| {
            let mut r = c.get();
            f(&mut r);
            c.set(r);
            r
        })
    }

    /// Value producer for the GATT server's dynamic reads.
    pub fn producer(&self) -> ValueProducer {
        let shared = self.clone();
        Box::new(move |characteristic: &BleUuid, service: &BleUuid| {
            if *service != SERVICE_UUID {
                return None;
            }
            shared.get().encode_for(characteristic).map(|b| b.to_vec())
        })
    }
}
