//! Unified error type for the WeatherNode firmware.
//!
//! Each subsystem keeps its own error enum; this one wraps them so boot
//! code can propagate any of them with `?`.  All variants are `Copy`.

use core::fmt;

use crate::ble::StackError;
use crate::config::ConfigError;
use crate::i2c::I2cError;
use crate::sensors::aht20::Aht20Error;
use crate::sensors::ltr390::Ltr390Error;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bus setup or a raw transaction failed.
    I2c(I2cError),
    /// UV / ambient light sensor.
    Light(Ltr390Error),
    /// Temperature / humidity sensor.
    Climate(Aht20Error),
    /// Bluetooth stack call returned a non-OK status.
    Ble(StackError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "i2c: {e}"),
            Self::Light(e) => write!(f, "ltr390: {e}"),
            Self::Climate(e) => write!(f, "aht20: {e}"),
            Self::Ble(e) => write!(f, "ble: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<I2cError> for Error {
    fn from(e: I2cError) -> Self {
        Self::I2c(e)
    }
}

impl From<Ltr390Error> for Error {
    fn from(e: Ltr390Error) -> Self {
        Self::Light(e)
    }
}

impl From<Aht20Error> for Error {
    fn from(e: Aht20Error) -> Self {
        Self::Climate(e)
    }
}

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Self::Ble(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
