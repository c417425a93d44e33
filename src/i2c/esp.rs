//! ESP-IDF legacy I2C master driver.
//!
//! Configured and installed once from `main()` via [`EspI2cTransport::setup`];
//! every transaction afterwards is a single blocking driver call.

use esp_idf_svc::sys::*;
use log::info;

use super::{I2cError, I2cTransaction, I2cTransport};
use crate::config::SystemConfig;

pub struct EspI2cTransport {
    port: i2c_port_t,
    frequency_hz: u32,
    sda_pin: i32,
    scl_pin: i32,
    sda_pullup: bool,
    scl_pullup: bool,
}

fn ms_to_ticks(timeout_ms: u32) -> TickType_t {
    let ticks = (u64::from(timeout_ms) * u64::from(configTICK_RATE_HZ)).div_ceil(1000);
    ticks.max(1) as TickType_t
}

impl EspI2cTransport {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            port: config.i2c_port as i2c_port_t,
            frequency_hz: config.i2c_frequency_hz,
            sda_pin: config.i2c_sda_gpio,
            scl_pin: config.i2c_scl_gpio,
            sda_pullup: config.i2c_sda_pullup,
            scl_pullup: config.i2c_scl_pullup,
        }
    }

    /// Configure bus role, pins, pull-ups and clock, then install the driver.
    pub fn setup(&self) -> Result<(), I2cError> {
        // SAFETY: called once from main() before either sensor driver runs.
        unsafe {
            let mut conf: i2c_config_t = core::mem::zeroed();
            conf.mode = i2c_mode_t_I2C_MODE_MASTER;
            conf.sda_io_num = self.sda_pin;
            conf.scl_io_num = self.scl_pin;
            conf.sda_pullup_en = self.sda_pullup;
            conf.scl_pullup_en = self.scl_pullup;
            conf.__bindgen_anon_1.master.clk_speed = self.frequency_hz;

            I2cError::check(i2c_param_config(self.port, &conf))?;
            I2cError::check(i2c_driver_install(self.port, conf.mode, 0, 0, 0))?;
        }
        info!(
            "I2C: port {} ready (sda={}, scl={}, {} Hz)",
            self.port, self.sda_pin, self.scl_pin, self.frequency_hz
        );
        Ok(())
    }
}

impl I2cTransport for EspI2cTransport {
    fn write_read_raw_data(
        &self,
        write_bytes: &[u8],
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError> {
        I2cTransaction::write_read(device_address, write_bytes, read_length, timeout_ms)
            .validate(true, true)?;
        let mut data = vec![0xFF; read_length];
        // SAFETY: both buffers outlive the blocking call.
        let rc = unsafe {
            i2c_master_write_read_device(
                self.port,
                device_address,
                write_bytes.as_ptr(),
                write_bytes.len(),
                data.as_mut_ptr(),
                read_length,
                ms_to_ticks(timeout_ms),
            )
        };
        I2cError::check(rc)?;
        Ok(data)
    }

    fn write_raw_data(
        &self,
        bytes: &[u8],
        device_address: u8,
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        I2cTransaction::write(device_address, bytes, timeout_ms).validate(false, true)?;
        // SAFETY: `bytes` outlives the blocking call.
        let rc = unsafe {
            i2c_master_write_to_device(
                self.port,
                device_address,
                bytes.as_ptr(),
                bytes.len(),
                ms_to_ticks(timeout_ms),
            )
        };
        I2cError::check(rc)
    }

    fn read_raw_data(
        &self,
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError> {
        I2cTransaction::read(device_address, read_length, timeout_ms).validate(true, false)?;
        let mut data = vec![0xFF; read_length];
        // SAFETY: `data` outlives the blocking call.
        let rc = unsafe {
            i2c_master_read_from_device(
                self.port,
                device_address,
                data.as_mut_ptr(),
                read_length,
                ms_to_ticks(timeout_ms),
            )
        };
        I2cError::check(rc)?;
        Ok(data)
    }
}
