//! Sensor drivers.
//!
//! | Driver               | Part           | Addr | Measures                   |
//! |----------------------|----------------|------|----------------------------|
//! | [`ltr390::Ltr390`]   | LTR-390UV-01   | 0x53 | ambient light (lux), UV index |
//! | [`aht20::Aht20`]     | AHT20          | 0x38 | temperature, humidity      |
//!
//! Both drivers are generic over [`I2cTransport`](crate::i2c::I2cTransport)
//! and share one bus by borrowing the same transport.

pub mod aht20;
pub mod ltr390;
