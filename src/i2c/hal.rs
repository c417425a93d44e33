//! [`I2cTransport`] over any `embedded_hal::i2c::I2c` bus.
//!
//! embedded-hal buses have no per-transaction timeout, so `timeout_ms` is
//! ignored here; the bus implementation's own timeout applies.

use core::cell::RefCell;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{I2cError, I2cTransaction, I2cTransport};

pub struct HalI2cTransport<I> {
    bus: RefCell<I>,
}

impl<I: I2c> HalI2cTransport<I> {
    pub fn new(bus: I) -> Self {
        Self { bus: RefCell::new(bus) }
    }

    pub fn release(self) -> I {
        self.bus.into_inner()
    }
}

fn map_kind(kind: ErrorKind) -> I2cError {
    match kind {
        ErrorKind::Bus | ErrorKind::NoAcknowledge(_) => I2cError::Fail,
        ErrorKind::ArbitrationLoss => I2cError::InvalidState,
        ErrorKind::Overrun => I2cError::InvalidLength,
        _ => I2cError::Undefined(-1),
    }
}

impl<I: I2c> I2cTransport for HalI2cTransport<I> {
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
        self.bus
            .borrow_mut()
            .write_read(device_address, write_bytes, &mut data)
            .map_err(|e| map_kind(e.kind()))?;
        Ok(data)
    }

    fn write_raw_data(
        &self,
        bytes: &[u8],
        device_address: u8,
        timeout_ms: u32,
    ) -> Result<(), I2cError> {
        I2cTransaction::write(device_address, bytes, timeout_ms).validate(false, true)?;
        self.bus
            .borrow_mut()
            .write(device_address, bytes)
            .map_err(|e| map_kind(e.kind()))
    }

    fn read_raw_data(
        &self,
        device_address: u8,
        read_length: usize,
        timeout_ms: u32,
    ) -> Result<Vec<u8>, I2cError> {
        I2cTransaction::read(device_address, read_length, timeout_ms).validate(true, false)?;
        let mut data = vec![0xFF; read_length];
        self.bus
            .borrow_mut()
            .read(device_address, &mut data)
            .map_err(|e| map_kind(e.kind()))?;
        Ok(data)
    }
}
