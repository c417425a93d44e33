//! Short-form Bluetooth UUIDs.
//!
//! Attribute tables carry 16- and 32-bit UUIDs in little-endian byte order,
//! as they appear on air.  Advertising service lists use the 128-bit form,
//! obtained by splicing the short value into the Bluetooth base UUID
//! `00000000-0000-1000-8000-00805F9B34FB`.

use core::fmt;

/// Bluetooth base UUID, little-endian.  Bytes 12..16 hold the short value.
const BASE_UUID_LE: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BleUuid {
    bytes: [u8; 4],
    len: u8,
}

impl BleUuid {
    pub const fn from_u16(uuid: u16) -> Self {
        let le = uuid.to_le_bytes();
        Self { bytes: [le[0], le[1], 0, 0], len: 2 }
    }

    pub const fn from_u32(uuid: u32) -> Self {
        Self { bytes: uuid.to_le_bytes(), len: 4 }
    }

    /// Little-endian bytes; two or four of them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    pub const fn value(&self) -> u32 {
        u32::from_le_bytes(self.bytes)
    }

    /// Full 128-bit UUID, little-endian.
    pub const fn to_uuid128(&self) -> [u8; 16] {
        let mut out = BASE_UUID_LE;
        out[12] = self.bytes[0];
        out[13] = self.bytes[1];
        out[14] = self.bytes[2];
        out[15] = self.bytes[3];
        out
    }
}

impl From<u16> for BleUuid {
    fn from(uuid: u16) -> Self {
        Self::from_u16(uuid)
    }
}

impl fmt::Debug for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len == 2 {
            write!(f, "0x{:04X}", self.value())
        } else {
            write!(f, "0x{:08X}", self.value())
        }
    }
}
