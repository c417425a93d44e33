//! I2C transport: register-addressed reads and writes on the two-wire bus.
//!
//! Both sensor drivers talk to the hardware exclusively through
//! [`I2cTransport`].  The transport performs exactly one bus transaction
//! per call and never retries; retry policy belongs to the drivers.
//!
//! | Implementation      | Target      | Backed by                          |
//! |---------------------|-------------|------------------------------------|
//! | [`EspI2cTransport`] | espidf      | legacy ESP-IDF I2C master driver   |
//! | [`HalI2cTransport`] | any         | any `embedded_hal::i2c::I2c` bus   |
//!
//! ```text
//!   write_read:  S addr+W [reg] Sr addr+R [N bytes] P
//!   write:       S addr+W [reg, payload...] P
//!   read:        S addr+R [N bytes] P
//! ```

mod hal;

#[cfg(target_os = "espidf")]
mod esp;

#[cfg(target_os = "espidf")]
pub use esp::EspI2cTransport;
pub use hal::HalI2cTransport;

use core::fmt;

// ───────────────────────────────────────────────────────────────
// ESP-IDF result codes (mirrors esp_err.h so mapping is host-testable)
// ───────────────────────────────────────────────────────────────

pub const ESP_OK: i32 = 0;
pub const ESP_FAIL: i32 = -1;
pub const ESP_ERR_INVALID_ARG: i32 = 0x102;
pub const ESP_ERR_INVALID_STATE: i32 = 0x103;
pub const ESP_ERR_TIMEOUT: i32 = 0x107;

// ───────────────────────────────────────────────────────────────
// Error type
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cError {
    /// Empty write buffer or zero-length read.
    InvalidLength,
    InvalidArgument,
    Fail,
    InvalidState,
    Timeout,
    /// Any other non-`ESP_OK` controller result.
    Undefined(i32),
}

impl I2cError {
    /// Map a raw `esp_err_t` to a transport error.  `ESP_OK` maps to `None`.
    pub const fn from_esp(code: i32) -> Option<Self> {
        match code {
            ESP_OK => None,
            ESP_ERR_INVALID_ARG => Some(Self::InvalidArgument),
            ESP_FAIL => Some(Self::Fail),
            ESP_ERR_INVALID_STATE => Some(Self::InvalidState),
            ESP_ERR_TIMEOUT => Some(Self::Timeout),
            other => Some(Self::Undefined(other)),
        }
    }

    /// `Ok(())` for `ESP_OK`, the mapped error otherwise.
    pub fn check(code: i32) -> Result<(), Self> {
        match Self::from_esp(code) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

impl fmt::Display for I2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "invalid length"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Fail => write!(f, "bus transaction failed"),
            Self::InvalidState => write!(f, "driver in invalid state"),
            Self::Timeout => write!(f, "bus timeout"),
            Self::Undefined(code) => write!(f, "undefined controller error ({})", code),
        }
    }
}

impl std::error::Error for I2cError {}

// ───────────────────────────────────────────────────────────────
// Transaction descriptor
// ───────────────────────────────────────────────────────────────

/// One bus operation, built per call and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cTransaction<'a> {
    pub device_address: u8,
    pub write_bytes: &'a [u8],
    pub read_length: usize,
    pub timeout_ms: u32,
}

impl<'a> I2cTransaction<'a> {
    pub const fn write_read(
        device_address: u8,
        write_bytes: &'a [u8],
        read_length: usize,
        timeout_ms: u32,
    ) -> Self {
        Self { device_address, write_bytes, read_length, timeout_ms }
    }

    pub const fn write(device_address: u8, write_bytes: &'a [u8], timeout_ms: u32) -> Self {
        Self { device_address, write_bytes, read_length: 0, timeout_ms }
    }

    pub const fn read(device_address: u8, read_length: usize, timeout_ms: u32) -> Self {
        Self { device_address, write_bytes: &[], read_length, timeout_ms }
    }

    /// Reads need `read_length > 0`; writes need a non-empty buffer.
    pub fn validate(&self, reads: bool, writes: bool) -> Result<(), I2cError> {
        if reads && self.read_length == 0 {
            return Err(I2cError::InvalidLength);
        }
        if writes && self.write_bytes.is_empty() {
            return Err(I2cError::InvalidLength);
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Transport trait
// ───────────────────────────────────────────────────────────────

/// Register-level access to a two-wire bus.
///
/// Methods take `&self` so that several drivers can share one bus through
/// the blanket `&T` impl.  Transactions are assumed not to interleave: the
/// bus is driven from a single task.
pub trait I2cTransport {
    /// Write `write_bytes` then read exactly `read_length` bytes in one
    /// combined transaction.
    fn write_read_raw_data(
        &self,
        write_bytes: &[u8],
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError>;

    /// Write `bytes` verbatim; the first byte is conventionally the target
    /// register address.
    fn write_raw_data(&self, bytes: &[u8], device_address: u8, timeout_ms: u32)
    -> Result<(), I2cError>;

    /// Plain read with no register prefix.
    fn read_raw_data(
        &self,
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError>;
}

impl<T: I2cTransport + ?Sized> I2cTransport for &T {
    fn write_read_raw_data(
        &self,
        write_bytes: &[u8],
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError> {
        (**self).write_read_raw_data(write_bytes, device_address, read_length, timeout_ms)
    }

    fn write_raw_data(
        &self,
        bytes: &[u8],
        device_address: u8,
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        (**self).write_raw_data(bytes, device_address, timeout_ms)
    }

    fn read_raw_data(
        &self,
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError> {
        (**self).read_raw_data(device_address, read_length, timeout_ms)
    }
}
