//! Blocking delay source for sensor timing and poll backoff.
//!
//! Drivers are generic over `embedded_hal::delay::DelayNs`; this is the
//! production implementation.
//!
//! - **`target_os = "espidf"`**: millisecond waits yield to the scheduler
//!   through FreeRTOS `vTaskDelay`; sub-millisecond waits busy-wait in ROM.
//! - **`not(target_os = "espidf")`**: `std::thread::sleep` for host-side
//!   simulation.

use embedded_hal::delay::DelayNs;

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskDelay;

impl TaskDelay {
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl DelayNs for TaskDelay {
    fn delay_ns(&mut self, ns: u32) {
        let us = ns.div_ceil(1000);
        if us < 1000 {
            esp_idf_hal::delay::Ets::delay_us(us);
        } else {
            esp_idf_hal::delay::FreeRtos::delay_ms(us.div_ceil(1000));
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

#[cfg(not(target_os = "espidf"))]
impl DelayNs for TaskDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
