//! GATT profile model and the WeatherNode profile.
//!
//! ## GATT Service Layout
//!
//! | Characteristic  | UUID     | Perms      | Props         | Value            |
//! |-----------------|----------|------------|---------------|------------------|
//! | Ambient light   | `0xFF01` | Read+Write | Read+Notify   | i32 LE, lux      |
//! | UV index        | `0xFF02` | Read+Write | Read+Notify   | i32 LE, UVI x100 |
//! | Temperature     | `0xFF03` | Read+Write | Read+Notify   | i32 LE, 0.01 °C  |
//! | Humidity        | `0xFF04` | Read+Write | Read+Notify   | i32 LE, 0.01 %RH |
//!
//! All four live in primary service `0x00FF` and carry a CCCD (`0x2902`).

use core::ops::BitOr;

use super::uuid::BleUuid;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: BleUuid = BleUuid::from_u16(0x00FF);
pub const CHAR_AMBIENT_LIGHT: BleUuid = BleUuid::from_u16(0xFF01);
pub const CHAR_UV_INDEX: BleUuid = BleUuid::from_u16(0xFF02);
pub const CHAR_TEMPERATURE: BleUuid = BleUuid::from_u16(0xFF03);
pub const CHAR_HUMIDITY: BleUuid = BleUuid::from_u16(0xFF04);

pub const PRIMARY_SERVICE: BleUuid = BleUuid::from_u16(0x2800);
pub const CHARACTERISTIC_DECLARATION: BleUuid = BleUuid::from_u16(0x2803);
pub const CLIENT_CHARACTERISTIC_CONFIG: BleUuid = BleUuid::from_u16(0x2902);

/// CCCD values.
pub const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];
pub const CCCD_INDICATE: [u8; 2] = [0x02, 0x00];
pub const CCCD_DISABLED: [u8; 2] = [0x00, 0x00];

const READING_LENGTH: u16 = 4;

// ───────────────────────────────────────────────────────────────
// Access flags
// ───────────────────────────────────────────────────────────────

/// Attribute access permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u8);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(0b01);
    pub const WRITE: Self = Self(0b10);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Permissions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Characteristic properties, encoded as in the characteristic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(u8);

impl Properties {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(0x02);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Properties {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Model
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: BleUuid,
    pub permissions: Permissions,
    pub max_length: u16,
    pub initial_value: heapless::Vec<u8, 2>,
}

impl Descriptor {
    /// Client Characteristic Configuration, initially unsubscribed.
    pub fn cccd() -> Self {
        Self {
            uuid: CLIENT_CHARACTERISTIC_CONFIG,
            permissions: Permissions::READ | Permissions::WRITE,
            max_length: 2,
            initial_value: heapless::Vec::from_slice(&CCCD_DISABLED).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: BleUuid,
    /// Initial value length.
    pub data_length: u16,
    pub max_length: u16,
    pub permissions: Permissions,
    pub properties: Properties,
    pub descriptor: Option<Descriptor>,
    /// Reads are answered by the value producer instead of the stored value.
    pub dynamic_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: BleUuid,
    pub primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn characteristic(&self, uuid: &BleUuid) -> Option<(usize, &Characteristic)> {
        self.characteristics.iter().enumerate().find(|(_, c)| c.uuid == *uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    pub services: Vec<Service>,
}

impl Profile {
    pub fn service(&self, uuid: &BleUuid) -> Option<(usize, &Service)> {
        self.services.iter().enumerate().find(|(_, s)| s.uuid == *uuid)
    }
}

fn reading(uuid: BleUuid) -> Characteristic {
    Characteristic {
        uuid,
        data_length: READING_LENGTH,
        max_length: READING_LENGTH,
        permissions: Permissions::READ | Permissions::WRITE,
        properties: Properties::READ | Properties::NOTIFY,
        descriptor: Some(Descriptor::cccd()),
        dynamic_read: true,
    }
}

/// Environmental service with the four sensor readings.
pub fn weather_node() -> Profile {
    Profile {
        services: vec![Service {
            uuid: SERVICE_UUID,
            primary: true,
            characteristics: vec![
                reading(CHAR_AMBIENT_LIGHT),
                reading(CHAR_UV_INDEX),
                reading(CHAR_TEMPERATURE),
                reading(CHAR_HUMIDITY),
            ],
        }],
    }
}
