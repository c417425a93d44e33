//! GATT server state machine.
//!
//! Driven entirely by stack callbacks; nothing here blocks.  Progress is
//! kept as flags rather than a linear state so events may arrive in any
//! order (the two advertisement acks race each other and the table-created
//! events).  [`ServerState`] is derived from those flags for observability.
//!
//! ```text
//!   Unregistered ─REG─▶ Registered ─ADV+SCAN ack─▶ AdvertisingConfigured
//!        ─▶ TableRequested ─TABLE×N─▶ TableCreated ─▶ Advertising
//!        ◀─DISCONNECT── Connected ◀─CONNECT──┘
//! ```
//!
//! Advertising starts once both advertisement payloads are acknowledged and
//! every service table exists, and restarts on every disconnect.

use log::{debug, error, info, warn};

use super::attr_table::{AttributeRole, AttributeTable, HandleLayout};
use super::events::{GapEvent, GattsEvent};
use super::profile::{CCCD_DISABLED, CCCD_INDICATE, CCCD_NOTIFY, Profile};
use super::stack::{
    AdvertisementData, AdvertisingParams, ConnParamsUpdate, GattStack, GattStatus, log_failure,
};
use super::uuid::BleUuid;
use crate::app::ports::ValueSink;
use crate::config::SystemConfig;

const ADV_DATA: u8 = 1 << 0;
const SCAN_RSP: u8 = 1 << 1;
const ADV_ALL: u8 = ADV_DATA | SCAN_RSP;

const DEFAULT_MTU: u16 = 23;
const ATT_INVALID_OFFSET: GattStatus = GattStatus(0x07);

/// Produces the current value of a dynamically read characteristic.
/// Arguments are (characteristic, service).
pub type ValueProducer = Box<dyn FnMut(&BleUuid, &BleUuid) -> Option<Vec<u8>> + Send>;

/// Receives every decoded stack event for one registered application.
pub trait GattEventHandler {
    fn on_gatts_event(&mut self, gatts_if: u8, event: &GattsEvent<'_>);
    fn on_gap_event(&mut self, event: &GapEvent);
}

// ───────────────────────────────────────────────────────────────
// State
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unregistered,
    /// Waiting for one or both advertisement acks.
    Registered,
    AdvertisingConfigured,
    TableRequested,
    TableCreated,
    Advertising,
    Connected,
}

/// Present only while a peer is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionContext {
    pub gatts_if: Option<u8>,
    pub conn_id: Option<u16>,
}

impl ConnectionContext {
    pub const fn is_connected(&self) -> bool {
        self.gatts_if.is_some() && self.conn_id.is_some()
    }
}

/// Result of [`GattServer::update_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Characteristic not in the profile, or its table is not created yet.
    Unknown,
    /// Value written to the attribute store only.
    Stored,
    /// Stored and pushed to the subscribed peer.
    Notified,
}

#[derive(Debug, Clone, Copy)]
struct ConnPreferences {
    min_interval: u16,
    max_interval: u16,
    latency: u16,
    timeout: u16,
}

// ───────────────────────────────────────────────────────────────
// Server
// ───────────────────────────────────────────────────────────────

pub struct GattServer<S> {
    stack: S,
    profile: Profile,
    table: AttributeTable,
    device_name: heapless::String<24>,
    adv_params: AdvertisingParams,
    conn_prefs: ConnPreferences,
    local_mtu: u16,

    registered_if: Option<u8>,
    adv_acked: u8,
    table_requested: bool,
    services_created: Vec<bool>,
    advertising: bool,
    /// Global handle array in profile order; 0 = not assigned yet.
    handles: Vec<u16>,
    connection: ConnectionContext,
    mtu: u16,
    producer: Option<ValueProducer>,
}

impl<S: GattStack> GattServer<S> {
    pub fn new(stack: S, profile: Profile, config: &SystemConfig) -> Self {
        let table = AttributeTable::build(&profile);
        let handles = vec![0; table.layout().total()];
        let services_created = vec![false; profile.services.len()];
        Self {
            stack,
            profile,
            table,
            device_name: config.device_name.clone(),
            adv_params: AdvertisingParams {
                interval_min: config.adv_interval_min,
                interval_max: config.adv_interval_max,
            },
            conn_prefs: ConnPreferences {
                min_interval: config.conn_interval_min,
                max_interval: config.conn_interval_max,
                latency: config.conn_latency,
                timeout: config.conn_supervision_timeout,
            },
            local_mtu: config.local_mtu,
            registered_if: None,
            adv_acked: 0,
            table_requested: false,
            services_created,
            advertising: false,
            handles,
            connection: ConnectionContext::default(),
            mtu: DEFAULT_MTU,
            producer: None,
        }
    }

    pub fn set_value_producer(&mut self, producer: ValueProducer) {
        self.producer = Some(producer);
    }

    pub fn state(&self) -> ServerState {
        if self.registered_if.is_none() {
            ServerState::Unregistered
        } else if self.connection.is_connected() {
            ServerState::Connected
        } else if self.advertising {
            ServerState::Advertising
        } else if self.tables_created() {
            ServerState::TableCreated
        } else if self.adv_acked != ADV_ALL {
            ServerState::Registered
        } else if self.table_requested {
            ServerState::TableRequested
        } else {
            ServerState::AdvertisingConfigured
        }
    }

    pub fn connection(&self) -> ConnectionContext {
        self.connection
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn handles(&self) -> &[u16] {
        &self.handles
    }

    pub fn layout(&self) -> &HandleLayout {
        self.table.layout()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    fn tables_created(&self) -> bool {
        self.services_created.iter().all(|c| *c)
    }

    // ── Outbound ─────────────────────────────────────────────

    /// Store `value` for the characteristic and notify the peer if it has
    /// subscribed.  Unknown characteristics and a missing peer are not
    /// errors.
    pub fn update_value(
        &mut self,
        value: &[u8],
        characteristic: &BleUuid,
        service: &BleUuid,
    ) -> UpdateOutcome {
        let Some(indices) = self.table.layout().find(characteristic, service) else {
            debug!("BLE: update for unknown characteristic {} in {}", characteristic, service);
            return UpdateOutcome::Unknown;
        };
        let value_handle = self.handles[indices.value];
        if value_handle == 0 {
            return UpdateOutcome::Unknown;
        }

        log_failure("set_attr_value", self.stack.set_attr_value(value_handle, value));

        let (Some(gatts_if), Some(conn_id)) = (self.connection.gatts_if, self.connection.conn_id)
        else {
            return UpdateOutcome::Stored;
        };
        let Some(descriptor_handle) = indices.descriptor.map(|i| self.handles[i]) else {
            return UpdateOutcome::Stored;
        };

        let subscribed = match self.stack.get_attr_value(descriptor_handle) {
            Ok(cccd) => cccd.first().is_some_and(|b| b & CCCD_NOTIFY[0] != 0),
            Err(e) => {
                error!("BLE: get_attr_value failed (err=0x{:x})", e.code);
                false
            }
        };
        if !subscribed {
            return UpdateOutcome::Stored;
        }

        match self.stack.send_notification(gatts_if, conn_id, value_handle, value) {
            Ok(()) => UpdateOutcome::Notified,
            Err(e) => {
                error!("BLE: send_indicate failed (err=0x{:x})", e.code);
                UpdateOutcome::Stored
            }
        }
    }

    fn maybe_start_advertising(&mut self) {
        if self.advertising
            || self.connection.is_connected()
            || self.adv_acked != ADV_ALL
            || !self.tables_created()
        {
            return;
        }
        self.request_advertising();
    }

    fn request_advertising(&mut self) {
        match self.stack.start_advertising(&self.adv_params) {
            Ok(()) => self.advertising = true,
            Err(e) => error!("BLE: start_advertising failed (err=0x{:x})", e.code),
        }
    }

    // ── GATTS handlers ───────────────────────────────────────

    fn on_register(&mut self, gatts_if: u8, status: u8, app_id: u16) {
        if status != 0 {
            error!("BLE GATTS: app {} registration failed (status=0x{:x})", app_id, status);
            return;
        }
        if self.registered_if == Some(gatts_if) {
            debug!("BLE GATTS: duplicate registration for if={}", gatts_if);
            return;
        }
        self.registered_if = Some(gatts_if);
        info!("BLE GATTS: app {} registered (if={})", app_id, gatts_if);

        log_failure("set_device_name", self.stack.set_device_name(&self.device_name));

        let services: Vec<BleUuid> = self.profile.services.iter().map(|s| s.uuid).collect();
        log_failure(
            "config_adv_data",
            self.stack.config_adv_data(&AdvertisementData::for_services(false, &services)),
        );
        log_failure(
            "config_scan_rsp_data",
            self.stack.config_adv_data(&AdvertisementData::for_services(true, &services)),
        );

        for index in 0..self.profile.services.len() {
            let Some(entries) = self.table.service_entries(index) else { continue };
            log_failure(
                "create_attr_tab",
                self.stack.create_attr_table(gatts_if, entries, index as u8),
            );
        }
        self.table_requested = true;

        log_failure("set_local_mtu", self.stack.set_local_mtu(self.local_mtu));
    }

    fn on_table_created(&mut self, status: u8, service_instance: u8, handles: &[u16]) {
        if status != 0 {
            error!("BLE GATTS: attribute table creation failed (status=0x{:x})", status);
            return;
        }
        let index = usize::from(service_instance);
        let Some(span) = self.table.layout().services().get(index) else {
            warn!("BLE GATTS: table created for unknown service instance {}", index);
            return;
        };
        if handles.len() != span.handle_count {
            error!(
                "BLE GATTS: service {} got {} handles, expected {}",
                span.uuid,
                handles.len(),
                span.handle_count
            );
            return;
        }
        if self.services_created[index] {
            debug!("BLE GATTS: duplicate table-created for service {}", span.uuid);
            return;
        }

        let (offset, uuid) = (span.offset, span.uuid);
        self.handles[offset..offset + handles.len()].copy_from_slice(handles);
        self.services_created[index] = true;
        info!("BLE GATTS: service {} table created (handle={})", uuid, handles[0]);

        log_failure("start_service", self.stack.start_service(handles[0]));
        self.maybe_start_advertising();
    }

    fn on_connect(&mut self, gatts_if: u8, conn_id: u16, remote_bda: [u8; 6]) {
        self.connection = ConnectionContext { gatts_if: Some(gatts_if), conn_id: Some(conn_id) };
        // Connectable advertising stops once a central connects.
        self.advertising = false;
        info!(
            "BLE GATTS: client connected (conn_id={}, addr={:02x?})",
            conn_id, remote_bda
        );

        let params = ConnParamsUpdate {
            remote_bda,
            min_interval: self.conn_prefs.min_interval,
            max_interval: self.conn_prefs.max_interval,
            latency: self.conn_prefs.latency,
            timeout: self.conn_prefs.timeout,
        };
        log_failure("update_conn_params", self.stack.update_conn_params(&params));
    }

    fn on_disconnect(&mut self, conn_id: u16, reason: u16) {
        info!("BLE GATTS: client disconnected (conn_id={}, reason=0x{:x})", conn_id, reason);
        self.connection = ConnectionContext::default();
        self.mtu = DEFAULT_MTU;
        self.clear_subscriptions();
        self.advertising = false;
        self.request_advertising();
    }

    /// Peers are never bonded, so the next one starts unsubscribed.
    fn clear_subscriptions(&mut self) {
        let layout = self.table.layout();
        let descriptors: Vec<u16> = self
            .handles
            .iter()
            .enumerate()
            .filter(|(i, h)| {
                **h != 0
                    && layout.locate(*i).is_some_and(|loc| loc.role == AttributeRole::Descriptor)
            })
            .map(|(_, h)| *h)
            .collect();
        for handle in descriptors {
            log_failure("set_attr_value", self.stack.set_attr_value(handle, &CCCD_DISABLED));
        }
    }

    fn handle_index(&self, handle: u16) -> Option<usize> {
        if handle == 0 {
            return None;
        }
        self.handles.iter().position(|h| *h == handle)
    }

    fn on_write(&mut self, gatts_if: u8, event: &GattsEvent<'_>) {
        let GattsEvent::Write { conn_id, trans_id, handle, need_rsp, is_prep, value, .. } = *event
        else {
            return;
        };

        let status = if is_prep {
            // Prepared data is applied on ExecWrite; only descriptors and
            // 4-byte values exist, so nothing is buffered.
            GattStatus::OK
        } else {
            self.apply_write(handle, value)
        };

        if need_rsp {
            log_failure(
                "send_response",
                self.stack.send_response(gatts_if, conn_id, trans_id, status, None),
            );
        }
    }

    fn apply_write(&mut self, handle: u16, value: &[u8]) -> GattStatus {
        let Some(index) = self.handle_index(handle) else {
            warn!("BLE GATTS: write to unknown handle {}", handle);
            return GattStatus::OK;
        };
        let layout = self.table.layout();
        let Some(location) = layout.locate(index) else {
            return GattStatus::OK;
        };
        let Some((_, characteristic)) = layout.characteristic(&location) else {
            return GattStatus::OK;
        };
        let uuid = characteristic.uuid;

        match location.role {
            AttributeRole::Descriptor => {
                if value.len() != 2 {
                    return GattStatus::INVALID_ATTR_LEN;
                }
                if value == CCCD_NOTIFY {
                    info!("BLE GATTS: notifications enabled for {}", uuid);
                } else if value == CCCD_DISABLED {
                    info!("BLE GATTS: notifications disabled for {}", uuid);
                } else if value == CCCD_INDICATE {
                    warn!("BLE GATTS: indications requested for {} (unsupported)", uuid);
                    return GattStatus::OK;
                } else {
                    warn!("BLE GATTS: unknown CCCD value {:02x?} for {}", value, uuid);
                    return GattStatus::OK;
                }
                log_failure("set_attr_value", self.stack.set_attr_value(handle, value));
                GattStatus::OK
            }
            AttributeRole::Value => {
                let max = usize::from(self.table.entries()[index].max_length);
                if value.len() > max {
                    return GattStatus::INVALID_ATTR_LEN;
                }
                debug!("BLE GATTS: value written for {} ({} bytes)", uuid, value.len());
                log_failure("set_attr_value", self.stack.set_attr_value(handle, value));
                GattStatus::OK
            }
            AttributeRole::ServiceDeclaration | AttributeRole::CharacteristicDeclaration => {
                GattStatus::OK
            }
        }
    }

    fn on_read(&mut self, gatts_if: u8, event: &GattsEvent<'_>) {
        let GattsEvent::Read { conn_id, trans_id, handle, offset, need_rsp, .. } = *event else {
            return;
        };
        if !need_rsp {
            // Auto-response attribute; the stack already answered.
            return;
        }

        let dynamic = self
            .handle_index(handle)
            .and_then(|i| self.table.layout().locate(i))
            .filter(|loc| loc.role == AttributeRole::Value)
            .and_then(|loc| {
                let (svc, c) = self.table.layout().characteristic(&loc)?;
                c.dynamic_read.then_some((c.uuid, svc.uuid))
            });

        let value = match (dynamic, self.producer.as_mut()) {
            (Some((char_uuid, svc_uuid)), Some(produce)) => {
                let produced = produce(&char_uuid, &svc_uuid);
                if let Some(bytes) = &produced {
                    log_failure("set_attr_value", self.stack.set_attr_value(handle, bytes));
                }
                produced
            }
            _ => self.stack.get_attr_value(handle).ok(),
        };

        let offset = usize::from(offset);
        let (status, payload) = match &value {
            Some(bytes) if offset <= bytes.len() => (GattStatus::OK, Some(&bytes[offset..])),
            Some(_) => (ATT_INVALID_OFFSET, None),
            None => (GattStatus::READ_NOT_PERMIT, None),
        };
        if !status.is_ok() {
            debug!("BLE GATTS: read of handle {} refused (0x{:x})", handle, status.0);
        }
        log_failure(
            "send_response",
            self.stack.send_response(
                gatts_if,
                conn_id,
                trans_id,
                status,
                payload.map(|p| (handle, p)),
            ),
        );
    }

    // ── Inbound dispatch ─────────────────────────────────────

    pub fn handle_gatts_event(&mut self, gatts_if: u8, event: &GattsEvent<'_>) {
        match *event {
            GattsEvent::Register { status, app_id } => self.on_register(gatts_if, status, app_id),
            GattsEvent::AttrTableCreated { status, service_instance, handles } => {
                self.on_table_created(status, service_instance, handles);
            }
            GattsEvent::Start { status, service_handle } => {
                if status == 0 {
                    info!("BLE GATTS: service started (handle={})", service_handle);
                } else {
                    error!("BLE GATTS: service {} start failed (status=0x{:x})", service_handle, status);
                }
            }
            GattsEvent::Connect { conn_id, remote_bda } => {
                self.on_connect(gatts_if, conn_id, remote_bda);
            }
            GattsEvent::Disconnect { conn_id, reason, .. } => self.on_disconnect(conn_id, reason),
            GattsEvent::Write { .. } => self.on_write(gatts_if, event),
            GattsEvent::Read { .. } => self.on_read(gatts_if, event),
            GattsEvent::ExecWrite { conn_id, trans_id } => {
                log_failure(
                    "send_response",
                    self.stack.send_response(gatts_if, conn_id, trans_id, GattStatus::OK, None),
                );
            }
            GattsEvent::Mtu { conn_id, mtu } => {
                self.mtu = mtu;
                info!("BLE GATTS: MTU {} (conn_id={})", mtu, conn_id);
            }
            GattsEvent::Conf { status, handle, .. } => {
                if status != 0 {
                    warn!("BLE GATTS: notify confirm failed (handle={}, status=0x{:x})", handle, status);
                }
            }
        }
    }

    pub fn handle_gap_event(&mut self, event: &GapEvent) {
        match *event {
            GapEvent::AdvDataSet { status } | GapEvent::ScanRspDataSet { status } => {
                let bit = if matches!(event, GapEvent::AdvDataSet { .. }) { ADV_DATA } else { SCAN_RSP };
                if status != 0 {
                    error!("BLE GAP: advertisement payload 0x{:x} rejected (status=0x{:x})", bit, status);
                }
                self.adv_acked |= bit;
                self.maybe_start_advertising();
            }
            GapEvent::AdvStart { status } => {
                if status == 0 {
                    info!("BLE GAP: advertising started");
                } else {
                    error!("BLE GAP: advertising start failed (status=0x{:x})", status);
                    self.advertising = false;
                }
            }
            GapEvent::AdvStop { status } => {
                info!("BLE GAP: advertising stopped (status=0x{:x})", status);
                self.advertising = false;
            }
            GapEvent::ConnParamsUpdated { status, conn_interval, latency, timeout, .. } => {
                info!(
                    "BLE GAP: conn params status={} interval={} latency={} timeout={}",
                    status, conn_interval, latency, timeout
                );
            }
        }
    }
}

impl<S: GattStack> GattEventHandler for GattServer<S> {
    fn on_gatts_event(&mut self, gatts_if: u8, event: &GattsEvent<'_>) {
        self.handle_gatts_event(gatts_if, event);
    }

    fn on_gap_event(&mut self, event: &GapEvent) {
        self.handle_gap_event(event);
    }
}

impl<S: GattStack> ValueSink for GattServer<S> {
    fn publish(&mut self, characteristic: &BleUuid, service: &BleUuid, value: &[u8]) -> UpdateOutcome {
        self.update_value(value, characteristic, service)
    }
}
