//! System configuration parameters
//!
//! All tunable parameters for the WeatherNode firmware.  Defaults match the
//! reference ESP32-C6 board wiring; a JSON override document may replace
//! any subset of fields.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- I2C bus ---
    /// I2C controller port number
    pub i2c_port: u8,
    /// SDA GPIO number
    pub i2c_sda_gpio: i32,
    /// SCL GPIO number
    pub i2c_scl_gpio: i32,
    pub i2c_sda_pullup: bool,
    pub i2c_scl_pullup: bool,
    /// Bus clock (Hz)
    pub i2c_frequency_hz: u32,
    /// Per-transaction timeout (milliseconds)
    pub i2c_timeout_ms: u32,

    // --- BLE ---
    /// GAP device name, included in advertising and scan response
    pub device_name: heapless::String<24>,
    /// Local ATT MTU offered to peers
    pub local_mtu: u16,
    /// Advertising interval bounds (0.625 ms units)
    pub adv_interval_min: u16,
    pub adv_interval_max: u16,
    /// Connection-parameter update requested on connect (1.25 ms units)
    pub conn_interval_min: u16,
    pub conn_interval_max: u16,
    pub conn_latency: u16,
    /// Supervision timeout (10 ms units)
    pub conn_supervision_timeout: u16,

    // --- Sampling ---
    /// Sensor poll cadence (milliseconds)
    pub poll_interval_ms: u32,
    /// Wait after switching LTR390 between ALS and UV mode (milliseconds)
    pub light_mode_settle_ms: u32,
    /// Maximum AHT20 status polls before giving up
    pub aht20_max_retries: u8,
    /// Delay between AHT20 status polls (milliseconds)
    pub aht20_poll_delay_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str("WeatherNode");

        Self {
            // I2C
            i2c_port: 0,
            i2c_sda_gpio: 6,
            i2c_scl_gpio: 7,
            i2c_sda_pullup: true,
            i2c_scl_pullup: true,
            i2c_frequency_hz: 400_000,
            i2c_timeout_ms: 10,

            // BLE
            device_name,
            local_mtu: 500,
            adv_interval_min: 0x20,
            adv_interval_max: 0x40,
            conn_interval_min: 0x10,
            conn_interval_max: 0x20,
            conn_latency: 0,
            conn_supervision_timeout: 400, // 4 s

            // Sampling
            poll_interval_ms: 1000,
            light_mode_settle_ms: 150,
            aht20_max_retries: 20,
            aht20_poll_delay_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// The override document could not be parsed.
    Parse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Parse => write!(f, "config document is not valid JSON"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SystemConfig {
    /// Parse a JSON override; absent fields keep their defaults.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(doc).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.i2c_frequency_hz == 0 {
            return Err(ConfigError::ValidationFailed("i2c_frequency_hz must be > 0"));
        }
        if self.i2c_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("i2c_timeout_ms must be > 0"));
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::ValidationFailed("device_name must not be empty"));
        }
        if self.local_mtu < 23 || self.local_mtu > 517 {
            return Err(ConfigError::ValidationFailed("local_mtu must be 23..=517"));
        }
        if self.adv_interval_min > self.adv_interval_max {
            return Err(ConfigError::ValidationFailed("adv interval min above max"));
        }
        if self.conn_interval_min > self.conn_interval_max {
            return Err(ConfigError::ValidationFailed("conn interval min above max"));
        }
        if self.aht20_max_retries == 0 {
            return Err(ConfigError::ValidationFailed("aht20_max_retries must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("poll_interval_ms must be > 0"));
        }
        Ok(())
    }
}
