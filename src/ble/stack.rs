//! Port trait over the Bluetooth host stack.
//!
//! Every call is fire-and-forget: the stack acknowledges through a later
//! GAP/GATTS event, and a non-OK return code only means the request was
//! not queued.  [`EspGattStack`](super::esp::EspGattStack) forwards to
//! Bluedroid; tests record the calls.

use core::fmt;

use log::error;

use super::attr_table::AttributeTableEntry;
use super::uuid::BleUuid;

pub type BdAddr = [u8; 6];

// ───────────────────────────────────────────────────────────────
// Errors and statuses
// ───────────────────────────────────────────────────────────────

/// Non-OK return code of a stack call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackError {
    pub code: i32,
}

impl StackError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn check(code: i32) -> Result<(), Self> {
        if code == 0 { Ok(()) } else { Err(Self { code }) }
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack error 0x{:x}", self.code)
    }
}

impl std::error::Error for StackError {}

/// Log a failed stack call with a title; the server keeps running.
pub(crate) fn log_failure(title: &str, result: Result<(), StackError>) {
    if let Err(e) = result {
        error!("BLE: {} failed (err=0x{:x})", title, e.code);
    }
}

/// ATT status carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const OK: Self = Self(0x00);
    pub const READ_NOT_PERMIT: Self = Self(0x02);
    pub const INVALID_ATTR_LEN: Self = Self(0x0d);

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Request parameters
// ───────────────────────────────────────────────────────────────

/// One of the two advertisement payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementData {
    pub scan_response: bool,
    pub include_name: bool,
    pub include_tx_power: bool,
    /// Preferred connection interval, 1.25 ms units.
    pub min_interval: u16,
    pub max_interval: u16,
    /// 128-bit service UUIDs, little-endian.
    pub service_uuids: Vec<[u8; 16]>,
    /// AD flags (general discoverable | BR/EDR not supported).
    pub flags: u8,
}

pub const ADV_FLAG_GENERAL_DISC: u8 = 0x02;
pub const ADV_FLAG_BREDR_NOT_SPT: u8 = 0x04;

impl AdvertisementData {
    pub fn for_services(scan_response: bool, services: &[BleUuid]) -> Self {
        Self {
            scan_response,
            include_name: true,
            include_tx_power: false,
            min_interval: 0x0006,
            max_interval: 0x0010,
            service_uuids: services.iter().map(BleUuid::to_uuid128).collect(),
            flags: ADV_FLAG_GENERAL_DISC | ADV_FLAG_BREDR_NOT_SPT,
        }
    }
}

/// Connectable undirected advertising on all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    /// 0.625 ms units.
    pub interval_min: u16,
    pub interval_max: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnParamsUpdate {
    pub remote_bda: BdAddr,
    /// 1.25 ms units.
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    /// 10 ms units.
    pub timeout: u16,
}

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

pub trait GattStack {
    fn set_device_name(&mut self, name: &str) -> Result<(), StackError>;

    fn config_adv_data(&mut self, data: &AdvertisementData) -> Result<(), StackError>;

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError>;

    fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError>;

    /// Submit one service's entries; handles arrive in `AttrTableCreated`.
    fn create_attr_table(
        &mut self,
        gatts_if: u8,
        entries: &[AttributeTableEntry],
        service_instance: u8,
    ) -> Result<(), StackError>;

    fn start_service(&mut self, service_handle: u16) -> Result<(), StackError>;

    fn set_attr_value(&mut self, handle: u16, value: &[u8]) -> Result<(), StackError>;

    fn get_attr_value(&mut self, handle: u16) -> Result<Vec<u8>, StackError>;

    /// Unconfirmed notification.
    fn send_notification(
        &mut self,
        gatts_if: u8,
        conn_id: u16,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError>;

    /// Response to a read or write; `value` carries the read payload.
    fn send_response(
        &mut self,
        gatts_if: u8,
        conn_id: u16,
        trans_id: u32,
        status: GattStatus,
        value: Option<(u16, &[u8])>,
    ) -> Result<(), StackError>;

    fn update_conn_params(&mut self, params: &ConnParamsUpdate) -> Result<(), StackError>;
}
