//! LTR-390UV-01 ambient light / UV sensor (I2C address 0x53).
//!
//! The driver caches every setting it writes.  Luminosity conversion uses
//! the cached gain and resolution rather than re-reading them, so callers
//! must not change those registers behind the driver's back.
//!
//! ## Register map
//!
//! | Register     | Addr | Len | Layout                                  |
//! |--------------|------|-----|-----------------------------------------|
//! | MAIN_CTRL    | 0x00 | 1   | bit 3 = UV mode, bit 1 = light sensor on|
//! | MEAS_RATE    | 0x04 | 1   | bits 6:4 resolution, bits 3:0 rate      |
//! | GAIN         | 0x05 | 1   | gain code                               |
//! | ALS_DATA     | 0x0D | 3   | little-endian 24-bit count              |
//! | UVS_DATA     | 0x10 | 3   | little-endian 24-bit count              |
//!
//! Resolution and measurement rate share MEAS_RATE: writing one merges the
//! cached value of the other into the same byte.

use core::fmt;

use log::info;

use crate::i2c::{I2cError, I2cTransport};

pub const DEVICE_ADDRESS: u8 = 0x53;
/// Counts per UV index unit at gain 18, 20-bit resolution.
pub const UV_SENSITIVITY: f64 = 2300.0;
const DEFAULT_TIMEOUT_MS: u32 = 10;

const MODE_BIT: u8 = 0x08;
const LIGHT_SENSOR_ENABLE_BIT: u8 = 0x02;
const RESOLUTION_MASK: u8 = 0x70;
const RATE_MASK: u8 = 0x0F;

// ───────────────────────────────────────────────────────────────
// Registers
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    MainControl,
    MeasurementResolution,
    Gain,
    AlsData,
    UvData,
}

impl Register {
    pub const fn address(self) -> u8 {
        match self {
            Self::MainControl => 0x00,
            Self::MeasurementResolution => 0x04,
            Self::Gain => 0x05,
            Self::AlsData => 0x0D,
            Self::UvData => 0x10,
        }
    }

    pub const fn length(self) -> usize {
        match self {
            Self::MainControl | Self::MeasurementResolution | Self::Gain => 1,
            Self::AlsData | Self::UvData => 3,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Als = 0,
    Uv = 1,
}

impl Mode {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Als),
            1 => Some(Self::Uv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Gain {
    One = 0,
    Three = 1,
    Six = 2,
    Nine = 3,
    Eighteen = 4,
}

impl Gain {
    pub const ALL: [Self; 5] = [Self::One, Self::Three, Self::Six, Self::Nine, Self::Eighteen];

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::One),
            1 => Some(Self::Three),
            2 => Some(Self::Six),
            3 => Some(Self::Nine),
            4 => Some(Self::Eighteen),
            _ => None,
        }
    }

    /// Analog gain multiplier.
    pub const fn factor(self) -> f64 {
        match self {
            Self::One => 1.0,
            Self::Three => 3.0,
            Self::Six => 6.0,
            Self::Nine => 9.0,
            Self::Eighteen => 18.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Resolution {
    TwentyBit = 0,
    NineteenBit = 1,
    EighteenBit = 2,
    SeventeenBit = 3,
    SixteenBit = 4,
    ThirteenBit = 5,
}

impl Resolution {
    pub const ALL: [Self; 6] = [
        Self::TwentyBit,
        Self::NineteenBit,
        Self::EighteenBit,
        Self::SeventeenBit,
        Self::SixteenBit,
        Self::ThirteenBit,
    ];

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::TwentyBit),
            1 => Some(Self::NineteenBit),
            2 => Some(Self::EighteenBit),
            3 => Some(Self::SeventeenBit),
            4 => Some(Self::SixteenBit),
            5 => Some(Self::ThirteenBit),
            _ => None,
        }
    }

    /// Integration time relative to 100 ms (18-bit).
    pub const fn integration_factor(self) -> f64 {
        match self {
            Self::TwentyBit => 4.0,
            Self::NineteenBit => 2.0,
            Self::EighteenBit => 1.0,
            Self::SeventeenBit => 0.5,
            Self::SixteenBit => 0.25,
            Self::ThirteenBit => 0.125, // not characterised in the datasheet
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MeasurementRate {
    TwentyFiveMs = 0,
    FiftyMs = 1,
    OneHundredMs = 2,
    TwoHundredMs = 3,
    FiveHundredMs = 4,
    OneSecond = 5,
    TwoSeconds = 6,
}

impl MeasurementRate {
    pub const ALL: [Self; 7] = [
        Self::TwentyFiveMs,
        Self::FiftyMs,
        Self::OneHundredMs,
        Self::TwoHundredMs,
        Self::FiveHundredMs,
        Self::OneSecond,
        Self::TwoSeconds,
    ];

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::TwentyFiveMs),
            1 => Some(Self::FiftyMs),
            2 => Some(Self::OneHundredMs),
            3 => Some(Self::TwoHundredMs),
            4 => Some(Self::FiveHundredMs),
            5 => Some(Self::OneSecond),
            6 => Some(Self::TwoSeconds),
            _ => None,
        }
    }

    pub const fn period_ms(self) -> u32 {
        match self {
            Self::TwentyFiveMs => 25,
            Self::FiftyMs => 50,
            Self::OneHundredMs => 100,
            Self::TwoHundredMs => 200,
            Self::FiveHundredMs => 500,
            Self::OneSecond => 1000,
            Self::TwoSeconds => 2000,
        }
    }
}

/// Last settings written to (or read back from) the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ltr390State {
    pub mode: Mode,
    pub light_sensor_enabled: bool,
    pub gain: Gain,
    pub resolution: Resolution,
    pub measurement_rate: MeasurementRate,
}

impl Default for Ltr390State {
    fn default() -> Self {
        Self {
            mode: Mode::Uv,
            light_sensor_enabled: false,
            gain: Gain::One,
            resolution: Resolution::TwentyBit,
            measurement_rate: MeasurementRate::TwentyFiveMs,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ltr390Error {
    /// A register byte did not decode to a known setting.
    InvalidData,
    /// Write payload length does not match the register width.
    InvalidDataLength,
    I2cReadError(I2cError),
    I2cWriteError(I2cError),
}

impl fmt::Display for Ltr390Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidData => write!(f, "register value out of range"),
            Self::InvalidDataLength => write!(f, "payload length does not match register"),
            Self::I2cReadError(e) => write!(f, "I2C read failed: {e}"),
            Self::I2cWriteError(e) => write!(f, "I2C write failed: {e}"),
        }
    }
}

impl std::error::Error for Ltr390Error {}

// ───────────────────────────────────────────────────────────────
// Conversions (pure)
// ───────────────────────────────────────────────────────────────

/// Combine three little-endian bytes into an unsigned 24-bit count.
pub fn le24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[2]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[0])
}

pub fn uv_index_from_raw(raw: u32) -> f64 {
    f64::from(raw) / UV_SENSITIVITY
}

pub fn lux_from_raw(raw: u32, gain: Gain, resolution: Resolution) -> f64 {
    (0.6 * f64::from(raw)) / (gain.factor() * resolution.integration_factor())
}

const fn measurement_register_byte(resolution: Resolution, rate: MeasurementRate) -> u8 {
    ((resolution as u8) << 4) | rate as u8
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

pub struct Ltr390<T> {
    i2c: T,
    timeout_ms: u32,
    state: Ltr390State,
}

impl<T: I2cTransport> Ltr390<T> {
    pub fn new(i2c: T) -> Self {
        Self { i2c, timeout_ms: DEFAULT_TIMEOUT_MS, state: Ltr390State::default() }
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Cached settings.
    pub fn state(&self) -> Ltr390State {
        self.state
    }

    pub fn release(self) -> T {
        self.i2c
    }

    /// Gain 18, 20-bit resolution; the measurement rate keeps its cached value.
    pub fn setup(&mut self) -> Result<(), Ltr390Error> {
        self.write_gain(Gain::Eighteen)?;
        let gain = self.read_gain()?;
        info!("LTR390: gain {:?} (x{})", gain, gain.factor());

        self.write_resolution(Resolution::TwentyBit)?;
        let resolution = self.read_resolution()?;
        info!("LTR390: resolution {:?}", resolution);
        Ok(())
    }

    pub fn setup_in_als_mode(&mut self) -> Result<(), Ltr390Error> {
        self.write_mode(Mode::Als, true)
    }

    pub fn setup_in_uv_mode(&mut self) -> Result<(), Ltr390Error> {
        self.write_mode(Mode::Uv, true)
    }

    // ── Measurements ─────────────────────────────────────────

    pub fn read_raw_uv(&mut self) -> Result<u32, Ltr390Error> {
        let data = self.read_register(Register::UvData)?;
        Ok(le24(&data))
    }

    pub fn read_uv_index(&mut self) -> Result<f64, Ltr390Error> {
        Ok(uv_index_from_raw(self.read_raw_uv()?))
    }

    pub fn read_raw_luminosity(&mut self) -> Result<u32, Ltr390Error> {
        let data = self.read_register(Register::AlsData)?;
        Ok(le24(&data))
    }

    /// Lux from the ALS count, scaled by the cached gain and resolution.
    pub fn read_luminosity(&mut self) -> Result<f64, Ltr390Error> {
        let raw = self.read_raw_luminosity()?;
        Ok(lux_from_raw(raw, self.state.gain, self.state.resolution))
    }

    // ── Mode ─────────────────────────────────────────────────

    pub fn read_mode(&mut self) -> Result<Mode, Ltr390Error> {
        let byte = self.read_register(Register::MainControl)?[0];
        let mode = Mode::from_bits((byte & MODE_BIT) >> 3).ok_or(Ltr390Error::InvalidData)?;
        self.state.mode = mode;
        self.state.light_sensor_enabled = byte & LIGHT_SENSOR_ENABLE_BIT != 0;
        Ok(mode)
    }

    /// Writes MAIN_CTRL with only the mode and enable bits set.
    pub fn write_mode(&mut self, mode: Mode, enable_light_sensor: bool) -> Result<(), Ltr390Error> {
        let mut byte = (mode as u8) << 3;
        if enable_light_sensor {
            byte |= LIGHT_SENSOR_ENABLE_BIT;
        }
        self.write_register(Register::MainControl, &[byte])?;
        self.state.mode = mode;
        self.state.light_sensor_enabled = enable_light_sensor;
        Ok(())
    }

    // ── Gain ─────────────────────────────────────────────────

    pub fn read_gain(&mut self) -> Result<Gain, Ltr390Error> {
        let byte = self.read_register(Register::Gain)?[0];
        let gain = Gain::from_bits(byte).ok_or(Ltr390Error::InvalidData)?;
        self.state.gain = gain;
        Ok(gain)
    }

    pub fn write_gain(&mut self, gain: Gain) -> Result<(), Ltr390Error> {
        self.write_register(Register::Gain, &[gain as u8])?;
        self.state.gain = gain;
        Ok(())
    }

    // ── Resolution / measurement rate (shared register) ──────

    pub fn read_resolution(&mut self) -> Result<Resolution, Ltr390Error> {
        let byte = self.read_register(Register::MeasurementResolution)?[0];
        let resolution =
            Resolution::from_bits((byte & RESOLUTION_MASK) >> 4).ok_or(Ltr390Error::InvalidData)?;
        self.state.resolution = resolution;
        Ok(resolution)
    }

    pub fn write_resolution(&mut self, resolution: Resolution) -> Result<(), Ltr390Error> {
        let byte = measurement_register_byte(resolution, self.state.measurement_rate);
        self.write_register(Register::MeasurementResolution, &[byte])?;
        self.state.resolution = resolution;
        Ok(())
    }

    pub fn read_measurement_rate(&mut self) -> Result<MeasurementRate, Ltr390Error> {
        let byte = self.read_register(Register::MeasurementResolution)?[0];
        let rate = MeasurementRate::from_bits(byte & RATE_MASK).ok_or(Ltr390Error::InvalidData)?;
        self.state.measurement_rate = rate;
        Ok(rate)
    }

    pub fn write_measurement_rate(&mut self, rate: MeasurementRate) -> Result<(), Ltr390Error> {
        let byte = measurement_register_byte(self.state.resolution, rate);
        self.write_register(Register::MeasurementResolution, &[byte])?;
        self.state.measurement_rate = rate;
        Ok(())
    }

    // ── Bus helpers ──────────────────────────────────────────

    fn read_register(&self, register: Register) -> Result<Vec<u8>, Ltr390Error> {
        let data = self
            .i2c
            .write_read_raw_data(&[register.address()], DEVICE_ADDRESS, register.length(), self.timeout_ms)
            .map_err(Ltr390Error::I2cReadError)?;
        if data.len() != register.length() {
            return Err(Ltr390Error::InvalidDataLength);
        }
        Ok(data)
    }

    fn write_register(&self, register: Register, payload: &[u8]) -> Result<(), Ltr390Error> {
        if payload.len() != register.length() {
            return Err(Ltr390Error::InvalidDataLength);
        }
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(register.address());
        frame.extend_from_slice(payload);
        self.i2c
            .write_raw_data(&frame, DEVICE_ADDRESS, self.timeout_ms)
            .map_err(Ltr390Error::I2cWriteError)
    }
}
