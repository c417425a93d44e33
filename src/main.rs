//! WeatherNode firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  EspI2cTransport ──▶ Ltr390 ─┐                               │
//! │                 └──▶ Aht20 ──┴▶ SensorPoller ─▶ SharedReadings│
//! │                                      │               ▲       │
//! │                               publish│               │read   │
//! │                                      ▼               │       │
//! │  Bluedroid ◀─ EspGattStack ◀─ GattServer ── ValueProducer     │
//! │      │                           ▲                           │
//! │      └── C trampolines ── HandlerTable                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sensor and BLE bring-up are independent: a failure in either is logged
//! and that subsystem is left disabled while the other keeps running.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use embedded_hal::delay::DelayNs;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use log::{error, info, warn};

use weathernode::app::{SensorPoller, SharedReadings};
use weathernode::ble::esp::{EspGattStack, SharedHandler};
use weathernode::ble::{GattServer, profile};
use weathernode::config::SystemConfig;
use weathernode::delay::TaskDelay;
use weathernode::i2c::EspI2cTransport;
use weathernode::sensors::aht20::Aht20;
use weathernode::sensors::ltr390::Ltr390;

const CONFIG_NAMESPACE: &str = "weathernode";
const CONFIG_KEY: &str = "config";

/// JSON override from NVS, falling back to defaults.
fn load_config(partition: EspDefaultNvsPartition) -> SystemConfig {
    let nvs = match EspNvs::new(partition, CONFIG_NAMESPACE, false) {
        Ok(nvs) => nvs,
        Err(_) => {
            info!("Config: no stored override, using defaults");
            return SystemConfig::default();
        }
    };
    let mut buf = [0u8; 512];
    match nvs.get_str(CONFIG_KEY, &mut buf) {
        Ok(Some(doc)) => match SystemConfig::from_json(doc) {
            Ok(cfg) => {
                info!("Config: loaded override from NVS");
                cfg
            }
            Err(e) => {
                warn!("Config: stored override rejected ({}), using defaults", e);
                SystemConfig::default()
            }
        },
        Ok(None) => SystemConfig::default(),
        Err(e) => {
            warn!("Config: NVS read failed ({}), using defaults", e);
            SystemConfig::default()
        }
    }
}

fn init_light<'a>(
    bus: &'a EspI2cTransport,
    config: &SystemConfig,
) -> weathernode::Result<Ltr390<&'a EspI2cTransport>> {
    let mut sensor = Ltr390::new(bus).with_timeout(config.i2c_timeout_ms);
    sensor.setup()?;
    Ok(sensor)
}

fn init_climate<'a>(
    bus: &'a EspI2cTransport,
    config: &SystemConfig,
) -> weathernode::Result<Aht20<&'a EspI2cTransport, TaskDelay>> {
    let mut sensor = Aht20::new(bus, TaskDelay::new())
        .with_timeout(config.i2c_timeout_ms)
        .with_retry_policy(config.aht20_max_retries, config.aht20_poll_delay_ms);
    sensor.setup()?;
    Ok(sensor)
}

fn init_ble(handler: SharedHandler) -> weathernode::Result<u16> {
    Ok(weathernode::ble::esp::start(handler)?)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("WeatherNode v{}", env!("CARGO_PKG_VERSION"));

    // Bluedroid needs NVS initialised before the controller starts; the
    // partition handle stays alive for the whole run.
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let config = load_config(nvs_partition.clone());

    let readings = SharedReadings::new();

    // ── 2. Sensors ────────────────────────────────────────────
    let bus = EspI2cTransport::new(&config);
    let bus_ready = match bus.setup().map_err(weathernode::Error::from) {
        Ok(()) => true,
        Err(e) => {
            error!("Boot: {}, sensors disabled", e);
            false
        }
    };

    let light = bus_ready
        .then(|| init_light(&bus, &config))
        .and_then(|r| r.inspect_err(|e| error!("Boot: {}, light sensor disabled", e)).ok());
    let climate = bus_ready
        .then(|| init_climate(&bus, &config))
        .and_then(|r| r.inspect_err(|e| error!("Boot: {}, climate sensor disabled", e)).ok());

    let mut poller = SensorPoller::new(
        light,
        climate,
        TaskDelay::new(),
        config.light_mode_settle_ms,
        readings.clone(),
    );

    // ── 3. BLE ────────────────────────────────────────────────
    let mut server = GattServer::new(EspGattStack::new(), profile::weather_node(), &config);
    server.set_value_producer(readings.producer());
    let mut server = Arc::new(Mutex::new(server));

    let handler: SharedHandler = server.clone();
    let ble_up = match init_ble(handler) {
        Ok(_) => true,
        Err(e) => {
            error!("Boot: {}, running sensors only", e);
            false
        }
    };

    // ── 4. Poll loop ──────────────────────────────────────────
    let mut delay = TaskDelay::new();
    loop {
        poller.poll_once();
        if ble_up {
            poller.publish(&mut server);
        }
        delay.delay_ms(config.poll_interval_ms);
    }
}
