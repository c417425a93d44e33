//! AHT20 temperature / humidity sensor (I2C address 0x38).
//!
//! The AHT20 has no register map: every interaction is a bare command
//! write or a bare read.  A read of one byte returns the status; a read of
//! six bytes returns a measurement frame.
//!
//! ```text
//!   byte 0   status
//!   byte 1   humidity[19:12]
//!   byte 2   humidity[11:4]
//!   byte 3   humidity[3:0] | temperature[19:16]
//!   byte 4   temperature[15:8]
//!   byte 5   temperature[7:0]
//! ```
//!
//! Setup walks `Uninitialized → WaitingReady → WaitingCalibrated → Ready`.
//! Both status polls are bounded by `max_retries`.

use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::i2c::{I2cError, I2cTransport};

pub const DEVICE_ADDRESS: u8 = 0x38;

const CMD_SOFT_RESET: [u8; 1] = [0xBA];
const CMD_CALIBRATE: [u8; 3] = [0xE1, 0x08, 0x00];
const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];

const STATUS_LEN: usize = 1;
const FRAME_LEN: usize = 6;

const RESET_SETTLE_MS: u32 = 20;
const CALIBRATE_SETTLE_MS: u32 = 75;
const MEASUREMENT_SETTLE_MS: u32 = 80;

const DEFAULT_TIMEOUT_MS: u32 = 10;
const DEFAULT_MAX_RETRIES: u8 = 20;
const DEFAULT_POLL_DELAY_MS: u32 = 10;

/// 2^20, full scale of both 20-bit fields.
const FULL_SCALE: f64 = 1_048_576.0;

// ── Status ───────────────────────────────────────────────────

/// Decoded status byte.  Derived from each read, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aht20Status {
    pub busy: bool,
    pub calibrated: bool,
}

impl Aht20Status {
    const BUSY: u8 = 1 << 7;
    const CALIBRATED: u8 = 1 << 3;

    pub const fn from_bits(bits: u8) -> Self {
        Self { busy: bits & Self::BUSY != 0, calibrated: bits & Self::CALIBRATED != 0 }
    }

    pub const fn is_ready(self) -> bool {
        !self.busy
    }
}

// ── Measurements ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aht20Data {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent relative humidity.
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aht20Frame {
    pub status: Aht20Status,
    pub raw_humidity: u32,
    pub raw_temperature: u32,
    pub data: Aht20Data,
}

/// Split the two 20-bit fields out of a measurement frame and convert them.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Aht20Frame {
    let raw_humidity =
        (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temperature =
        (u32::from(frame[3] & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    Aht20Frame {
        status: Aht20Status::from_bits(frame[0]),
        raw_humidity,
        raw_temperature,
        data: Aht20Data {
            temperature: f64::from(raw_temperature) * 200.0 / FULL_SCALE - 50.0,
            humidity: f64::from(raw_humidity) * 100.0 / FULL_SCALE,
        },
    }
}

// ── Errors ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aht20Error {
    /// Calibrated bit never observed within the retry budget.
    CalibrationFailed,
    /// Busy bit never cleared within the retry budget.
    NotReady,
    I2cReadError(I2cError),
    I2cWriteError(I2cError),
}

impl fmt::Display for Aht20Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CalibrationFailed => write!(f, "calibration failed"),
            Self::NotReady => write!(f, "measurement not ready"),
            Self::I2cReadError(e) => write!(f, "I2C read failed: {e}"),
            Self::I2cWriteError(e) => write!(f, "I2C write failed: {e}"),
        }
    }
}

impl std::error::Error for Aht20Error {}

// ── Driver ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aht20Phase {
    Uninitialized,
    WaitingReady,
    WaitingCalibrated,
    Ready,
}

pub struct Aht20<T, D> {
    i2c: T,
    delay: D,
    phase: Aht20Phase,
    timeout_ms: u32,
    max_retries: u8,
    poll_delay_ms: u32,
}

impl<T: I2cTransport, D: DelayNs> Aht20<T, D> {
    pub fn new(i2c: T, delay: D) -> Self {
        Self {
            i2c,
            delay,
            phase: Aht20Phase::Uninitialized,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Bound on status polls, and the wait between them.
    pub fn with_retry_policy(mut self, max_retries: u8, poll_delay_ms: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self.poll_delay_ms = poll_delay_ms;
        self
    }

    pub fn phase(&self) -> Aht20Phase {
        self.phase
    }

    pub fn release(self) -> (T, D) {
        (self.i2c, self.delay)
    }

    /// Soft reset, calibrate, then wait for idle and for the calibrated bit.
    pub fn setup(&mut self) -> Result<(), Aht20Error> {
        self.phase = Aht20Phase::Uninitialized;

        self.write_command(&CMD_SOFT_RESET)?;
        self.delay.delay_ms(RESET_SETTLE_MS);

        self.write_command(&CMD_CALIBRATE)?;
        self.delay.delay_ms(CALIBRATE_SETTLE_MS);

        self.phase = Aht20Phase::WaitingReady;
        if self.poll_status(|s| s.is_ready())?.is_none() {
            warn!("AHT20: still busy after {} polls", self.max_retries);
            return Err(Aht20Error::CalibrationFailed);
        }

        self.phase = Aht20Phase::WaitingCalibrated;
        if self.poll_status(|s| s.calibrated)?.is_none() {
            warn!("AHT20: calibrated bit never set");
            return Err(Aht20Error::CalibrationFailed);
        }

        self.phase = Aht20Phase::Ready;
        info!("AHT20: calibrated");
        Ok(())
    }

    pub fn request_measurement(&mut self) -> Result<(), Aht20Error> {
        self.write_command(&CMD_TRIGGER)
    }

    pub fn read_status(&mut self) -> Result<Aht20Status, Aht20Error> {
        let data = self
            .i2c
            .read_raw_data(DEVICE_ADDRESS, STATUS_LEN, self.timeout_ms)
            .map_err(Aht20Error::I2cReadError)?;
        let bits =
            data.first().copied().ok_or(Aht20Error::I2cReadError(I2cError::InvalidLength))?;
        Ok(Aht20Status::from_bits(bits))
    }

    pub fn is_ready(&mut self) -> Result<bool, Aht20Error> {
        Ok(self.read_status()?.is_ready())
    }

    /// With `polling`, trigger a measurement and wait for it; otherwise
    /// read whatever frame the sensor currently holds.
    pub fn read_data(&mut self, polling: bool) -> Result<Aht20Data, Aht20Error> {
        if polling {
            self.request_measurement()?;
            self.delay.delay_ms(MEASUREMENT_SETTLE_MS);
            if self.poll_status(|s| s.is_ready())?.is_none() {
                return Err(Aht20Error::NotReady);
            }
        }

        let data = self
            .i2c
            .read_raw_data(DEVICE_ADDRESS, FRAME_LEN, self.timeout_ms)
            .map_err(Aht20Error::I2cReadError)?;
        let frame: [u8; FRAME_LEN] =
            data.as_slice().try_into().map_err(|_| Aht20Error::I2cReadError(I2cError::InvalidLength))?;

        let decoded = decode_frame(&frame);
        debug!(
            "AHT20: raw hum={} temp={} -> {:.2}%RH {:.2}C",
            decoded.raw_humidity, decoded.raw_temperature, decoded.data.humidity, decoded.data.temperature
        );
        Ok(decoded.data)
    }

    /// Poll until `done` holds, at most `max_retries` reads.
    fn poll_status(
        &mut self,
        done: impl Fn(Aht20Status) -> bool,
    ) -> Result<Option<Aht20Status>, Aht20Error> {
        for attempt in 0..self.max_retries {
            let status = self.read_status()?;
            if done(status) {
                return Ok(Some(status));
            }
            if attempt + 1 < self.max_retries {
                self.delay.delay_ms(self.poll_delay_ms);
            }
        }
        Ok(None)
    }

    fn write_command(&mut self, command: &[u8]) -> Result<(), Aht20Error> {
        self.i2c
            .write_raw_data(command, DEVICE_ADDRESS, self.timeout_ms)
            .map_err(Aht20Error::I2cWriteError)
    }
}
