//! Bluedroid bindings: [`GattStack`] over `esp_idf_svc::sys`, the C callback
//! trampolines, and one-time controller bring-up.
//!
//! Bluedroid callbacks are C function pointers that cannot capture Rust
//! closures.  Both trampolines decode the raw parameter block into
//! [`GattsEvent`] / [`GapEvent`] and route it through [`HANDLERS`].

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use esp_idf_svc::sys::*;
use log::{error, info, warn};

use super::attr_table::AttributeTableEntry;
use super::dispatch::HandlerTable;
use super::events::{GapEvent, GattsEvent};
use super::profile::Permissions;
use super::server::GattEventHandler;
use super::stack::{
    AdvertisementData, AdvertisingParams, ConnParamsUpdate, GattStack, GattStatus, StackError,
};

pub type SharedHandler = Arc<Mutex<dyn GattEventHandler + Send>>;

const MAX_APPS: usize = 4;

static HANDLERS: Mutex<HandlerTable<SharedHandler, MAX_APPS>> = Mutex::new(HandlerTable::new());

// ───────────────────────────────────────────────────────────────
// GattStack implementation
// ───────────────────────────────────────────────────────────────

/// Bluedroid GATT server calls.
///
/// Attribute-table creation is processed asynchronously on the BTC task,
/// which only copies the descriptor array; UUID and value buffers are kept
/// in `retained` for the lifetime of the stack.
#[derive(Default)]
pub struct EspGattStack {
    retained: Vec<Vec<u8>>,
}

impl EspGattStack {
    pub fn new() -> Self {
        Self::default()
    }
}

const fn esp_permissions(perms: Permissions) -> u16 {
    let mut out = 0;
    if perms.contains(Permissions::READ) {
        out |= ESP_GATT_PERM_READ as u16;
    }
    if perms.contains(Permissions::WRITE) {
        out |= ESP_GATT_PERM_WRITE as u16;
    }
    out
}

impl GattStack for EspGattStack {
    fn set_device_name(&mut self, name: &str) -> Result<(), StackError> {
        let name = CString::new(name).map_err(|_| StackError::new(ESP_ERR_INVALID_ARG as i32))?;
        // SAFETY: the stack copies the name before returning.
        StackError::check(unsafe { esp_ble_gap_set_device_name(name.as_ptr()) })
    }

    fn config_adv_data(&mut self, data: &AdvertisementData) -> Result<(), StackError> {
        let mut uuids: Vec<u8> = data.service_uuids.iter().flatten().copied().collect();
        // SAFETY: zeroed is a valid "no optional fields" payload; the stack
        // deep-copies the service UUID buffer.
        unsafe {
            let mut adv: esp_ble_adv_data_t = core::mem::zeroed();
            adv.set_scan_rsp = data.scan_response;
            adv.include_name = data.include_name;
            adv.include_txpower = data.include_tx_power;
            adv.min_interval = i32::from(data.min_interval) as _;
            adv.max_interval = i32::from(data.max_interval) as _;
            adv.service_uuid_len = uuids.len() as u16;
            adv.p_service_uuid = if uuids.is_empty() { core::ptr::null_mut() } else { uuids.as_mut_ptr() };
            adv.flag = data.flags;
            StackError::check(esp_ble_gap_config_adv_data(&mut adv))
        }
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), StackError> {
        // SAFETY: params are copied by the stack.
        unsafe {
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: params.interval_min,
                adv_int_max: params.interval_max,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            StackError::check(esp_ble_gap_start_advertising(&mut adv_params))
        }
    }

    fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError> {
        // SAFETY: plain value call.
        StackError::check(unsafe { esp_ble_gatt_set_local_mtu(mtu) })
    }

    fn create_attr_table(
        &mut self,
        gatts_if: u8,
        entries: &[AttributeTableEntry],
        service_instance: u8,
    ) -> Result<(), StackError> {
        let mut db = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut uuid = entry.uuid.as_bytes().to_vec();
            let mut value = entry.value.clone();
            db.push(esp_gatts_attr_db_t {
                attr_control: esp_attr_control_t {
                    auto_rsp: (if entry.auto_response { ESP_GATT_AUTO_RSP } else { ESP_GATT_RSP_BY_APP }) as u8,
                },
                att_desc: esp_attr_desc_t {
                    uuid_length: uuid.len() as u16,
                    uuid_p: uuid.as_mut_ptr(),
                    perm: esp_permissions(entry.permissions),
                    max_length: entry.max_length,
                    length: value.len() as u16,
                    value: if value.is_empty() { core::ptr::null_mut() } else { value.as_mut_ptr() },
                },
            });
            // Heap contents stay put when the Vecs move into `retained`.
            self.retained.push(uuid);
            self.retained.push(value);
        }
        // SAFETY: the descriptor array is copied; the buffers it points to
        // live in `retained`.
        StackError::check(unsafe {
            esp_ble_gatts_create_attr_tab(db.as_ptr(), gatts_if, db.len() as _, service_instance)
        })
    }

    fn start_service(&mut self, service_handle: u16) -> Result<(), StackError> {
        // SAFETY: plain value call.
        StackError::check(unsafe { esp_ble_gatts_start_service(service_handle) })
    }

    fn set_attr_value(&mut self, handle: u16, value: &[u8]) -> Result<(), StackError> {
        // SAFETY: the stack copies `value` before returning.
        StackError::check(unsafe {
            esp_ble_gatts_set_attr_value(handle, value.len() as u16, value.as_ptr())
        })
    }

    fn get_attr_value(&mut self, handle: u16) -> Result<Vec<u8>, StackError> {
        let mut len: u16 = 0;
        let mut ptr: *const u8 = core::ptr::null();
        // SAFETY: on success `ptr` points at `len` bytes owned by the stack's
        // attribute store; they are copied out immediately.
        unsafe {
            let status = esp_ble_gatts_get_attr_value(handle, &mut len, &mut ptr);
            if status != esp_gatt_status_t_ESP_GATT_OK || ptr.is_null() {
                return Err(StackError::new(status as i32));
            }
            Ok(core::slice::from_raw_parts(ptr, usize::from(len)).to_vec())
        }
    }

    fn send_notification(
        &mut self,
        gatts_if: u8,
        conn_id: u16,
        handle: u16,
        value: &[u8],
    ) -> Result<(), StackError> {
        let mut buf = value.to_vec();
        // SAFETY: the stack copies `buf` before returning.
        StackError::check(unsafe {
            esp_ble_gatts_send_indicate(gatts_if, conn_id, handle, buf.len() as u16, buf.as_mut_ptr(), false)
        })
    }

    fn send_response(
        &mut self,
        gatts_if: u8,
        conn_id: u16,
        trans_id: u32,
        status: GattStatus,
        value: Option<(u16, &[u8])>,
    ) -> Result<(), StackError> {
        // SAFETY: `rsp` outlives the call; union writes go to `attr_value`.
        unsafe {
            let mut rsp: esp_gatt_rsp_t = core::mem::zeroed();
            let rsp_ptr = match value {
                Some((handle, bytes)) => {
                    let n = bytes.len().min(rsp.attr_value.value.len());
                    rsp.attr_value.handle = handle;
                    rsp.attr_value.len = n as u16;
                    rsp.attr_value.value[..n].copy_from_slice(&bytes[..n]);
                    &mut rsp as *mut esp_gatt_rsp_t
                }
                None => core::ptr::null_mut(),
            };
            StackError::check(esp_ble_gatts_send_response(
                gatts_if,
                conn_id,
                trans_id,
                status.0 as esp_gatt_status_t,
                rsp_ptr,
            ))
        }
    }

    fn update_conn_params(&mut self, params: &ConnParamsUpdate) -> Result<(), StackError> {
        let mut p = esp_ble_conn_update_params_t {
            bda: params.remote_bda,
            min_int: params.min_interval,
            max_int: params.max_interval,
            latency: params.latency,
            timeout: params.timeout,
        };
        // SAFETY: params are copied by the stack.
        StackError::check(unsafe { esp_ble_gap_update_conn_params(&mut p) })
    }
}

// ───────────────────────────────────────────────────────────────
// Trampolines
// ───────────────────────────────────────────────────────────────

/// Decode a GATTS parameter block.  `None` for events the server ignores.
unsafe fn decode_gatts<'a>(
    event: esp_gatts_cb_event_t,
    param: &'a esp_ble_gatts_cb_param_t,
) -> Option<GattsEvent<'a>> {
    // SAFETY: the active union member is selected by `event`.
    unsafe {
        Some(match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => GattsEvent::Register {
                status: param.reg.status as u8,
                app_id: param.reg.app_id,
            },
            esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                let p = &param.read;
                GattsEvent::Read {
                    conn_id: p.conn_id,
                    trans_id: p.trans_id,
                    handle: p.handle,
                    offset: p.offset,
                    is_long: p.is_long,
                    need_rsp: p.need_rsp,
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &param.write;
                let value = if p.value.is_null() {
                    &[][..]
                } else {
                    core::slice::from_raw_parts(p.value, usize::from(p.len))
                };
                GattsEvent::Write {
                    conn_id: p.conn_id,
                    trans_id: p.trans_id,
                    handle: p.handle,
                    offset: p.offset,
                    need_rsp: p.need_rsp,
                    is_prep: p.is_prep,
                    value,
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => GattsEvent::ExecWrite {
                conn_id: param.exec_write.conn_id,
                trans_id: param.exec_write.trans_id,
            },
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => GattsEvent::Mtu {
                conn_id: param.mtu.conn_id,
                mtu: param.mtu.mtu,
            },
            esp_gatts_cb_event_t_ESP_GATTS_START_EVT => GattsEvent::Start {
                status: param.start.status as u8,
                service_handle: param.start.service_handle,
            },
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => GattsEvent::Connect {
                conn_id: param.connect.conn_id,
                remote_bda: param.connect.remote_bda,
            },
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => GattsEvent::Disconnect {
                conn_id: param.disconnect.conn_id,
                remote_bda: param.disconnect.remote_bda,
                reason: param.disconnect.reason as u16,
            },
            esp_gatts_cb_event_t_ESP_GATTS_CREAT_ATTR_TAB_EVT => {
                let p = &param.add_attr_tab;
                let handles = if p.handles.is_null() {
                    &[][..]
                } else {
                    core::slice::from_raw_parts(p.handles, usize::from(p.num_handle))
                };
                GattsEvent::AttrTableCreated {
                    status: p.status as u8,
                    service_instance: p.svc_inst_id,
                    handles,
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONF_EVT => GattsEvent::Conf {
                status: param.conf.status as u8,
                conn_id: param.conf.conn_id,
                handle: param.conf.handle,
            },
            _ => return None,
        })
    }
}

unsafe fn decode_gap(event: esp_gap_ble_cb_event_t, param: &esp_ble_gap_cb_param_t) -> Option<GapEvent> {
    // SAFETY: the active union member is selected by `event`.
    unsafe {
        Some(match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => GapEvent::AdvDataSet {
                status: param.adv_data_cmpl.status as u8,
            },
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RSP_DATA_SET_COMPLETE_EVT => {
                GapEvent::ScanRspDataSet { status: param.scan_rsp_data_cmpl.status as u8 }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => GapEvent::AdvStart {
                status: param.adv_start_cmpl.status as u8,
            },
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => GapEvent::AdvStop {
                status: param.adv_stop_cmpl.status as u8,
            },
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_UPDATE_CONN_PARAMS_EVT => {
                let p = &param.update_conn_params;
                GapEvent::ConnParamsUpdated {
                    status: p.status as u8,
                    min_interval: p.min_int,
                    max_interval: p.max_int,
                    latency: p.latency,
                    conn_interval: p.conn_int,
                    timeout: p.timeout,
                }
            }
            _ => return None,
        })
    }
}

unsafe extern "C" fn gatts_trampoline(
    event: esp_gatts_cb_event_t,
    gatts_if: esp_gatt_if_t,
    param: *mut esp_ble_gatts_cb_param_t,
) {
    if param.is_null() {
        return;
    }
    // SAFETY: Bluedroid passes a parameter block valid for this call.
    let Some(decoded) = (unsafe { decode_gatts(event, &*param) }) else {
        return;
    };

    let handler = match HANDLERS.lock() {
        Ok(mut table) => match decoded {
            // Interface ids are only known from here on.
            GattsEvent::Register { app_id, status } => {
                if status == esp_gatt_status_t_ESP_GATT_OK as u8 && !table.bind_interface(app_id, gatts_if) {
                    warn!("BLE GATTS: registration for unknown app {}", app_id);
                }
                table.by_app_id(app_id).cloned()
            }
            _ => table.resolve(gatts_if).cloned(),
        },
        Err(_) => None,
    };
    // Table lock is released before the handler runs.
    if let Some(handler) = handler {
        if let Ok(mut h) = handler.lock() {
            h.on_gatts_event(gatts_if, &decoded);
        }
    }
}

unsafe extern "C" fn gap_trampoline(event: esp_gap_ble_cb_event_t, param: *mut esp_ble_gap_cb_param_t) {
    if param.is_null() {
        return;
    }
    // SAFETY: Bluedroid passes a parameter block valid for this call.
    let Some(decoded) = (unsafe { decode_gap(event, &*param) }) else {
        return;
    };

    let handlers: Vec<SharedHandler> = match HANDLERS.lock() {
        Ok(table) => table.handlers().cloned().collect(),
        Err(_) => return,
    };
    for handler in handlers {
        if let Ok(mut h) = handler.lock() {
            h.on_gap_event(&decoded);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Bring-up
// ───────────────────────────────────────────────────────────────

fn step(title: &str, rc: esp_err_t) -> Result<(), StackError> {
    StackError::check(rc).inspect_err(|e| error!("BLE: {} failed (err=0x{:x})", title, e.code))
}

/// Bring up the controller and Bluedroid, then register `handler` as a GATT
/// application.  Returns the app id it was registered under.  The handler
/// sets the local MTU itself once registration completes.
pub fn start(handler: SharedHandler) -> Result<u16, StackError> {
    // SAFETY: called once from main() before any other BT API.
    unsafe {
        // BLE-only: release classic BT memory.
        step("mem_release", esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT))?;

        let mut bt_cfg = esp_bt_controller_config_t::default();
        step("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))?;
        step("bt_controller_enable", esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))?;
        step("bluedroid_init", esp_bluedroid_init())?;
        step("bluedroid_enable", esp_bluedroid_enable())?;

        step("gatts_register_callback", esp_ble_gatts_register_callback(Some(gatts_trampoline)))?;
        step("gap_register_callback", esp_ble_gap_register_callback(Some(gap_trampoline)))?;
    }

    let app_id = HANDLERS
        .lock()
        .map_err(|_| StackError::new(ESP_ERR_INVALID_STATE as i32))?
        .register(handler)
        .ok_or(StackError::new(ESP_ERR_NO_MEM as i32))?;

    // SAFETY: plain value call after Bluedroid is enabled.
    if let Err(e) = step("gatts_app_register", unsafe { esp_ble_gatts_app_register(app_id) }) {
        if let Ok(mut table) = HANDLERS.lock() {
            table.remove(app_id);
        }
        return Err(e);
    }

    info!("BLE: Bluedroid up (app_id={})", app_id);
    Ok(app_id)
}
