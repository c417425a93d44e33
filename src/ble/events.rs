//! Stack events, decoded from callback parameters into plain Rust values.
//!
//! Borrowed payloads (`value`, `handles`) point into the callback's
//! parameter block and are only valid for the duration of the dispatch.

use super::stack::BdAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    AdvDataSet { status: u8 },
    ScanRspDataSet { status: u8 },
    AdvStart { status: u8 },
    AdvStop { status: u8 },
    ConnParamsUpdated {
        status: u8,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        conn_interval: u16,
        timeout: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattsEvent<'a> {
    Register { status: u8, app_id: u16 },
    Read {
        conn_id: u16,
        trans_id: u32,
        handle: u16,
        offset: u16,
        is_long: bool,
        need_rsp: bool,
    },
    Write {
        conn_id: u16,
        trans_id: u32,
        handle: u16,
        offset: u16,
        need_rsp: bool,
        is_prep: bool,
        value: &'a [u8],
    },
    ExecWrite { conn_id: u16, trans_id: u32 },
    Mtu { conn_id: u16, mtu: u16 },
    Start { status: u8, service_handle: u16 },
    Connect { conn_id: u16, remote_bda: BdAddr },
    Disconnect { conn_id: u16, remote_bda: BdAddr, reason: u16 },
    AttrTableCreated { status: u8, service_instance: u8, handles: &'a [u16] },
    Conf { status: u8, conn_id: u16, handle: u16 },
}
