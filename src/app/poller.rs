//! Sensor poll loop body.
//!
//! One [`SensorPoller::poll_once`] takes a full set of readings:
//!
//! ```text
//!   LTR390 → ALS mode, settle, lux
//!   LTR390 → UV mode,  settle, UV index
//!   AHT20  → trigger, wait ready, temperature + humidity
//! ```
//!
//! A sensor whose setup failed at boot is absent; a failed read keeps the
//! previous value.  Nothing here touches BLE directly: readings go into
//! [`SharedReadings`] and [`SensorPoller::publish`] pushes them to a
//! [`ValueSink`].

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use super::ports::{ClimateSensorPort, LightSensorPort, ValueSink};
use super::state::{EnvironmentReadings, SharedReadings};
use crate::ble::profile::{
    CHAR_AMBIENT_LIGHT, CHAR_HUMIDITY, CHAR_TEMPERATURE, CHAR_UV_INDEX, SERVICE_UUID,
};
use crate::ble::{BleUuid, UpdateOutcome};

const PUBLISHED: [BleUuid; 4] = [CHAR_AMBIENT_LIGHT, CHAR_UV_INDEX, CHAR_TEMPERATURE, CHAR_HUMIDITY];

pub struct SensorPoller<L, C, D> {
    light: Option<L>,
    climate: Option<C>,
    delay: D,
    settle_ms: u32,
    readings: SharedReadings,
}

impl<L: LightSensorPort, C: ClimateSensorPort, D: DelayNs> SensorPoller<L, C, D> {
    pub fn new(
        light: Option<L>,
        climate: Option<C>,
        delay: D,
        settle_ms: u32,
        readings: SharedReadings,
    ) -> Self {
        Self { light, climate, delay, settle_ms, readings }
    }

    pub fn readings(&self) -> &SharedReadings {
        &self.readings
    }

    pub fn has_light_sensor(&self) -> bool {
        self.light.is_some()
    }

    pub fn has_climate_sensor(&self) -> bool {
        self.climate.is_some()
    }

    /// Read every present sensor once and fold the results into the
    /// shared readings.  Returns the updated snapshot.
    pub fn poll_once(&mut self) -> EnvironmentReadings {
        let mut lux = None;
        let mut uv_index = None;
        let mut climate = None;

        if let Some(light) = self.light.as_mut() {
            match light.enter_als_mode() {
                Ok(()) => {
                    self.delay.delay_ms(self.settle_ms);
                    match light.luminosity() {
                        Ok(v) => lux = Some(v),
                        Err(e) => warn!("LTR390: luminosity read failed: {}", e),
                    }
                }
                Err(e) => warn!("LTR390: ALS mode switch failed: {}", e),
            }
            match light.enter_uv_mode() {
                Ok(()) => {
                    self.delay.delay_ms(self.settle_ms);
                    match light.uv_index() {
                        Ok(v) => uv_index = Some(v),
                        Err(e) => warn!("LTR390: UV index read failed: {}", e),
                    }
                }
                Err(e) => warn!("LTR390: UV mode switch failed: {}", e),
            }
        }

        if let Some(sensor) = self.climate.as_mut() {
            match sensor.measure() {
                Ok(data) => climate = Some(data),
                Err(e) => warn!("AHT20: measurement failed: {}", e),
            }
        }

        let snapshot = self.readings.update(|r| {
            if lux.is_some() {
                r.lux = lux;
            }
            if uv_index.is_some() {
                r.uv_index = uv_index;
            }
            if let Some(data) = climate {
                r.temperature_c = Some(data.temperature);
                r.humidity_pct = Some(data.humidity);
            }
        });
        debug!(
            "Poller: lux={:?} uvi={:?} temp={:?} hum={:?}",
            snapshot.lux, snapshot.uv_index, snapshot.temperature_c, snapshot.humidity_pct
        );
        snapshot
    }

    /// Push every available reading to `sink`.  Returns how many were
    /// notified to a subscribed peer.
    pub fn publish(&self, sink: &mut impl ValueSink) -> usize {
        let snapshot = self.readings.get();
        PUBLISHED
            .iter()
            .filter_map(|uuid| snapshot.encode_for(uuid).map(|bytes| (uuid, bytes)))
            .filter(|(uuid, bytes)| sink.publish(uuid, &SERVICE_UUID, bytes) == UpdateOutcome::Notified)
            .count()
    }
}
