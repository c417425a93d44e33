//! GATT server state machine driven by synthetic stack events.

use weathernode::app::{EnvironmentReadings, SharedReadings};
use weathernode::ble::attr_table::AttributeRole;
use weathernode::ble::profile::{
    self, CCCD_DISABLED, CCCD_INDICATE, CCCD_NOTIFY, CHAR_AMBIENT_LIGHT, CHAR_HUMIDITY,
    CHAR_TEMPERATURE, CHAR_UV_INDEX, SERVICE_UUID,
};
use weathernode::ble::{
    BleUuid, GapEvent, GattServer, GattStatus, GattsEvent, ServerState, UpdateOutcome,
};
use weathernode::config::SystemConfig;

use super::mock_hw::{FakeGattStack, StackCall};

const IF: u8 = 3;
const CONN: u16 = 1;
const PEER: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
const FIRST_HANDLE: u16 = 40;

// Handle indices within the weather-node table.
const UV_VALUE: usize = 5;
const UV_CCCD: usize = 6;
const TEMP_VALUE: usize = 8;
const HUM_VALUE: usize = 11;

fn new_server() -> GattServer<FakeGattStack> {
    GattServer::new(FakeGattStack::new(), profile::weather_node(), &SystemConfig::default())
}

fn register(server: &mut GattServer<FakeGattStack>) {
    server.handle_gatts_event(IF, &GattsEvent::Register { status: 0, app_id: 0 });
}

fn create_table(server: &mut GattServer<FakeGattStack>) {
    let handles = server.stack_mut().assign_handles(0, FIRST_HANDLE);
    server.handle_gatts_event(
        IF,
        &GattsEvent::AttrTableCreated { status: 0, service_instance: 0, handles: &handles },
    );
}

fn ack_advertisements(server: &mut GattServer<FakeGattStack>) {
    server.handle_gap_event(&GapEvent::ScanRspDataSet { status: 0 });
    server.handle_gap_event(&GapEvent::AdvDataSet { status: 0 });
}

/// Registered, table created, both payloads acknowledged.
fn advertising_server() -> GattServer<FakeGattStack> {
    let mut server = new_server();
    register(&mut server);
    create_table(&mut server);
    ack_advertisements(&mut server);
    server
}

fn connect(server: &mut GattServer<FakeGattStack>) {
    server.handle_gatts_event(IF, &GattsEvent::Connect { conn_id: CONN, remote_bda: PEER });
}

fn write(server: &mut GattServer<FakeGattStack>, handle: u16, value: &[u8]) {
    server.handle_gatts_event(
        IF,
        &GattsEvent::Write {
            conn_id: CONN,
            trans_id: 7,
            handle,
            offset: 0,
            need_rsp: true,
            is_prep: false,
            value,
        },
    );
}

fn read(server: &mut GattServer<FakeGattStack>, handle: u16, offset: u16) {
    server.handle_gatts_event(
        IF,
        &GattsEvent::Read { conn_id: CONN, trans_id: 9, handle, offset, is_long: false, need_rsp: true },
    );
}

fn handle(server: &GattServer<FakeGattStack>, index: usize) -> u16 {
    server.handles()[index]
}

fn last_status(server: &GattServer<FakeGattStack>) -> GattStatus {
    match server.stack().last_response() {
        Some(StackCall::Response { status, .. }) => *status,
        other => panic!("expected a response, got {:?}", other),
    }
}

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn registration_sets_name_advertisement_and_requests_table() {
    let mut server = new_server();
    assert_eq!(server.state(), ServerState::Unregistered);

    register(&mut server);

    let calls = &server.stack().calls;
    assert_eq!(calls[0], StackCall::SetDeviceName("WeatherNode".to_string()));
    match (&calls[1], &calls[2]) {
        (StackCall::ConfigAdvData(adv), StackCall::ConfigAdvData(scan)) => {
            assert!(!adv.scan_response);
            assert!(scan.scan_response);
            assert_eq!(adv.service_uuids, vec![SERVICE_UUID.to_uuid128()]);
            assert!(adv.include_name);
        }
        other => panic!("unexpected calls {:?}", other),
    }
    assert_eq!(
        calls[3],
        StackCall::CreateAttrTable { gatts_if: IF, service_instance: 0, entries: 13 }
    );
    assert_eq!(calls[4], StackCall::SetLocalMtu(SystemConfig::default().local_mtu));
    assert_eq!(server.state(), ServerState::Registered);
    assert_eq!(server.stack().advertising_starts(), 0);
}

#[test]
fn failed_or_duplicate_registration_is_ignored() {
    let mut server = new_server();
    server.handle_gatts_event(IF, &GattsEvent::Register { status: 0x85, app_id: 0 });
    assert_eq!(server.state(), ServerState::Unregistered);
    assert!(server.stack().calls.is_empty());

    register(&mut server);
    register(&mut server);
    assert_eq!(
        server.stack().count(|c| matches!(c, StackCall::SetDeviceName(_))),
        1
    );
}

#[test]
fn advertising_waits_for_table_when_acks_arrive_first() {
    let mut server = new_server();
    register(&mut server);

    server.handle_gap_event(&GapEvent::AdvDataSet { status: 0 });
    assert_eq!(server.state(), ServerState::Registered);
    server.handle_gap_event(&GapEvent::ScanRspDataSet { status: 0 });
    assert_eq!(server.state(), ServerState::TableRequested);
    assert_eq!(server.stack().advertising_starts(), 0);

    create_table(&mut server);

    assert!(server.stack().calls.contains(&StackCall::StartService(FIRST_HANDLE)));
    assert_eq!(server.stack().advertising_starts(), 1);
    assert_eq!(server.state(), ServerState::Advertising);
}

#[test]
fn advertising_waits_for_both_acks_when_table_arrives_first() {
    let mut server = new_server();
    register(&mut server);
    create_table(&mut server);
    assert_eq!(server.state(), ServerState::TableCreated);

    server.handle_gap_event(&GapEvent::ScanRspDataSet { status: 0 });
    assert_eq!(server.stack().advertising_starts(), 0);

    server.handle_gap_event(&GapEvent::AdvDataSet { status: 0 });
    assert_eq!(server.stack().advertising_starts(), 1);

    let params = server.stack().calls.iter().find_map(|c| match c {
        StackCall::StartAdvertising(p) => Some(*p),
        _ => None,
    });
    let config = SystemConfig::default();
    assert_eq!(params.map(|p| (p.interval_min, p.interval_max)), Some((config.adv_interval_min, config.adv_interval_max)));
}

#[test]
fn table_with_wrong_handle_count_or_bad_status_is_rejected() {
    let mut server = new_server();
    register(&mut server);

    let short: Vec<u16> = (40..50).collect();
    server.handle_gatts_event(
        IF,
        &GattsEvent::AttrTableCreated { status: 0, service_instance: 0, handles: &short },
    );
    let full: Vec<u16> = (40..53).collect();
    server.handle_gatts_event(
        IF,
        &GattsEvent::AttrTableCreated { status: 0x85, service_instance: 0, handles: &full },
    );
    server.handle_gatts_event(
        IF,
        &GattsEvent::AttrTableCreated { status: 0, service_instance: 4, handles: &full },
    );

    assert!(server.handles().iter().all(|h| *h == 0));
    assert_eq!(server.stack().count(|c| matches!(c, StackCall::StartService(_))), 0);
}

#[test]
fn handles_map_onto_profile_positions() {
    let server = advertising_server();

    assert_eq!(server.handles().len(), 13);
    assert_eq!(handle(&server, 0), FIRST_HANDLE);
    assert_eq!(handle(&server, UV_VALUE), FIRST_HANDLE + 5);

    let loc = server.layout().locate(UV_VALUE).unwrap();
    assert_eq!(loc.service, 0);
    assert_eq!(loc.characteristic, Some(1));
    assert_eq!(loc.role, AttributeRole::Value);
    let (svc, ch) = server.layout().characteristic(&loc).unwrap();
    assert_eq!((svc.uuid, ch.uuid), (SERVICE_UUID, CHAR_UV_INDEX));

    let idx = server.layout().find(&CHAR_UV_INDEX, &SERVICE_UUID).unwrap();
    assert_eq!(idx.value, UV_VALUE);
    assert_eq!(idx.descriptor, Some(UV_CCCD));
}

// ── Connection lifecycle ──────────────────────────────────────

#[test]
fn connect_records_context_and_requests_parameters() {
    let mut server = advertising_server();
    connect(&mut server);

    assert_eq!(server.state(), ServerState::Connected);
    assert_eq!(server.connection().gatts_if, Some(IF));
    assert_eq!(server.connection().conn_id, Some(CONN));

    let config = SystemConfig::default();
    let update = server.stack().calls.iter().find_map(|c| match c {
        StackCall::UpdateConnParams(p) => Some(*p),
        _ => None,
    });
    let update = update.expect("connection parameter update");
    assert_eq!(update.remote_bda, PEER);
    assert_eq!(update.min_interval, config.conn_interval_min);
    assert_eq!(update.max_interval, config.conn_interval_max);
    assert_eq!(update.latency, config.conn_latency);
    assert_eq!(update.timeout, config.conn_supervision_timeout);
}

#[test]
fn disconnect_clears_context_and_restarts_advertising_once() {
    let mut server = advertising_server();
    connect(&mut server);
    server.handle_gatts_event(IF, &GattsEvent::Mtu { conn_id: CONN, mtu: 247 });
    assert_eq!(server.mtu(), 247);
    let before = server.stack().advertising_starts();

    server.handle_gatts_event(
        IF,
        &GattsEvent::Disconnect { conn_id: CONN, remote_bda: PEER, reason: 0x13 },
    );

    assert!(!server.connection().is_connected());
    assert_eq!(server.connection().gatts_if, None);
    assert_eq!(server.mtu(), 23);
    assert_eq!(server.stack().advertising_starts(), before + 1);
    assert_eq!(server.state(), ServerState::Advertising);

    // A late ack after reconnect-advertising does not start it twice.
    server.handle_gap_event(&GapEvent::AdvDataSet { status: 0 });
    assert_eq!(server.stack().advertising_starts(), before + 1);
}

#[test]
fn adv_stop_drops_back_to_table_created() {
    let mut server = advertising_server();
    server.handle_gap_event(&GapEvent::AdvStop { status: 0 });
    assert_eq!(server.state(), ServerState::TableCreated);
}

// ── Notifications ─────────────────────────────────────────────

#[test]
fn subscribed_peer_receives_notification() {
    let mut server = advertising_server();
    connect(&mut server);

    let uv_cccd = handle(&server, UV_CCCD);
    write(&mut server, uv_cccd, &CCCD_NOTIFY);
    assert_eq!(last_status(&server), GattStatus::OK);
    assert_eq!(server.stack().attrs[&handle(&server, UV_CCCD)], CCCD_NOTIFY.to_vec());

    let value = 327i32.to_le_bytes();
    let outcome = server.update_value(&value, &CHAR_UV_INDEX, &SERVICE_UUID);

    assert_eq!(outcome, UpdateOutcome::Notified);
    assert_eq!(server.stack().notifications(), vec![(handle(&server, UV_VALUE), value.to_vec())]);
    assert_eq!(server.stack().attrs[&handle(&server, UV_VALUE)], value.to_vec());
}

#[test]
fn unsubscribed_or_disconnected_peer_gets_stored_value_only() {
    let mut server = advertising_server();
    let value = 100i32.to_le_bytes();

    // Not connected.
    assert_eq!(server.update_value(&value, &CHAR_UV_INDEX, &SERVICE_UUID), UpdateOutcome::Stored);

    // Connected but CCCD still 0x0000.
    connect(&mut server);
    assert_eq!(server.update_value(&value, &CHAR_UV_INDEX, &SERVICE_UUID), UpdateOutcome::Stored);

    // Subscribed, then unsubscribed.
    let uv_cccd = handle(&server, UV_CCCD);
    write(&mut server, uv_cccd, &CCCD_NOTIFY);
    write(&mut server, uv_cccd, &CCCD_DISABLED);
    assert_eq!(server.update_value(&value, &CHAR_UV_INDEX, &SERVICE_UUID), UpdateOutcome::Stored);

    assert!(server.stack().notifications().is_empty());
    assert_eq!(server.stack().attrs[&handle(&server, UV_VALUE)], value.to_vec());
}

#[test]
fn subscription_does_not_survive_into_a_disconnected_update() {
    let mut server = advertising_server();
    connect(&mut server);
    let uv_cccd = handle(&server, UV_CCCD);
    write(&mut server, uv_cccd, &CCCD_NOTIFY);
    server.handle_gatts_event(
        IF,
        &GattsEvent::Disconnect { conn_id: CONN, remote_bda: PEER, reason: 0x13 },
    );

    let outcome = server.update_value(&[1, 0, 0, 0], &CHAR_UV_INDEX, &SERVICE_UUID);
    assert_eq!(outcome, UpdateOutcome::Stored);
    assert!(server.stack().notifications().is_empty());
}

#[test]
fn next_peer_starts_unsubscribed() {
    let mut server = advertising_server();
    connect(&mut server);
    let uv_cccd = handle(&server, UV_CCCD);
    write(&mut server, uv_cccd, &CCCD_NOTIFY);
    server.handle_gatts_event(
        IF,
        &GattsEvent::Disconnect { conn_id: CONN, remote_bda: PEER, reason: 0x13 },
    );
    assert_eq!(server.stack().attrs[&uv_cccd], CCCD_DISABLED.to_vec());

    // A different central connects and never writes the CCCD.
    server.handle_gatts_event(IF, &GattsEvent::Connect { conn_id: 2, remote_bda: [0x11; 6] });
    let outcome = server.update_value(&[1, 0, 0, 0], &CHAR_UV_INDEX, &SERVICE_UUID);

    assert_eq!(outcome, UpdateOutcome::Stored);
    assert!(server.stack().notifications().is_empty());
}

#[test]
fn unknown_characteristic_or_missing_table_is_a_no_op() {
    let mut server = new_server();
    register(&mut server);
    // Table not created yet.
    assert_eq!(
        server.update_value(&[0; 4], &CHAR_AMBIENT_LIGHT, &SERVICE_UUID),
        UpdateOutcome::Unknown
    );

    create_table(&mut server);
    server.stack_mut().clear_calls();
    assert_eq!(
        server.update_value(&[0; 4], &BleUuid::from_u16(0xFF09), &SERVICE_UUID),
        UpdateOutcome::Unknown
    );
    assert_eq!(
        server.update_value(&[0; 4], &CHAR_AMBIENT_LIGHT, &BleUuid::from_u16(0x181A)),
        UpdateOutcome::Unknown
    );
    assert!(server.stack().calls.is_empty());
}

#[test]
fn failed_notification_falls_back_to_stored() {
    let mut server = advertising_server();
    connect(&mut server);
    let uv_cccd = handle(&server, UV_CCCD);
    write(&mut server, uv_cccd, &CCCD_NOTIFY);
    server.stack_mut().fail_notifications = true;

    assert_eq!(
        server.update_value(&[1, 0, 0, 0], &CHAR_UV_INDEX, &SERVICE_UUID),
        UpdateOutcome::Stored
    );
}

// ── Writes ────────────────────────────────────────────────────

#[test]
fn cccd_write_validation() {
    let mut server = advertising_server();
    connect(&mut server);
    let cccd = handle(&server, UV_CCCD);

    write(&mut server, cccd, &[0x01]);
    assert_eq!(last_status(&server), GattStatus::INVALID_ATTR_LEN);

    write(&mut server, cccd, &CCCD_INDICATE);
    assert_eq!(last_status(&server), GattStatus::OK);
    // Indications are not supported; the stored value stays disabled.
    assert_eq!(server.stack().attrs[&cccd], CCCD_DISABLED.to_vec());

    write(&mut server, cccd, &[0x05, 0x00]);
    assert_eq!(server.stack().attrs[&cccd], CCCD_DISABLED.to_vec());
}

#[test]
fn value_write_respects_max_length() {
    let mut server = advertising_server();
    connect(&mut server);
    let h = handle(&server, TEMP_VALUE);

    write(&mut server, h, &[1, 2, 3, 4, 5]);
    assert_eq!(last_status(&server), GattStatus::INVALID_ATTR_LEN);
    assert_eq!(server.stack().attrs[&h], vec![0; 4]);

    write(&mut server, h, &[1, 2, 3, 4]);
    assert_eq!(last_status(&server), GattStatus::OK);
    assert_eq!(server.stack().attrs[&h], vec![1, 2, 3, 4]);
}

#[test]
fn prepared_and_exec_writes_are_acknowledged() {
    let mut server = advertising_server();
    connect(&mut server);

    server.handle_gatts_event(
        IF,
        &GattsEvent::Write {
            conn_id: CONN,
            trans_id: 11,
            handle: handle(&server, TEMP_VALUE),
            offset: 0,
            need_rsp: true,
            is_prep: true,
            value: &[9, 9],
        },
    );
    assert_eq!(last_status(&server), GattStatus::OK);

    server.handle_gatts_event(IF, &GattsEvent::ExecWrite { conn_id: CONN, trans_id: 12 });
    assert_eq!(
        server.stack().last_response(),
        Some(&StackCall::Response {
            gatts_if: IF,
            conn_id: CONN,
            trans_id: 12,
            status: GattStatus::OK,
            value: None,
        })
    );
}

#[test]
fn write_without_response_request_sends_none() {
    let mut server = advertising_server();
    connect(&mut server);
    server.handle_gatts_event(
        IF,
        &GattsEvent::Write {
            conn_id: CONN,
            trans_id: 1,
            handle: handle(&server, UV_CCCD),
            offset: 0,
            need_rsp: false,
            is_prep: false,
            value: &CCCD_NOTIFY,
        },
    );
    assert!(server.stack().last_response().is_none());
    assert_eq!(server.stack().attrs[&handle(&server, UV_CCCD)], CCCD_NOTIFY.to_vec());
}

// ── Reads ─────────────────────────────────────────────────────

#[test]
fn dynamic_read_serves_latest_reading() {
    let readings = SharedReadings::new();
    let mut server = advertising_server();
    server.set_value_producer(readings.producer());
    connect(&mut server);

    readings.set(EnvironmentReadings { temperature_c: Some(21.5), ..Default::default() });
    let h = handle(&server, TEMP_VALUE);
    read(&mut server, h, 0);

    assert_eq!(
        server.stack().last_response(),
        Some(&StackCall::Response {
            gatts_if: IF,
            conn_id: CONN,
            trans_id: 9,
            status: GattStatus::OK,
            value: Some((h, 2150i32.to_le_bytes().to_vec())),
        })
    );
    // The produced value is mirrored into the attribute store.
    assert_eq!(server.stack().attrs[&h], 2150i32.to_le_bytes().to_vec());
}

#[test]
fn dynamic_read_without_reading_is_refused() {
    let readings = SharedReadings::new();
    let mut server = advertising_server();
    server.set_value_producer(readings.producer());
    connect(&mut server);

    let hum_value = handle(&server, HUM_VALUE);
    read(&mut server, hum_value, 0);
    assert_eq!(last_status(&server), GattStatus::READ_NOT_PERMIT);
}

#[test]
fn read_offset_slices_value() {
    let readings = SharedReadings::new();
    readings.set(EnvironmentReadings { humidity_pct: Some(41.2), ..Default::default() });
    let mut server = advertising_server();
    server.set_value_producer(readings.producer());
    connect(&mut server);
    let h = handle(&server, HUM_VALUE);

    read(&mut server, h, 2);
    match server.stack().last_response() {
        Some(StackCall::Response { status, value, .. }) => {
            assert_eq!(*status, GattStatus::OK);
            assert_eq!(value.as_ref().map(|(_, v)| v.clone()), Some(vec![0x00, 0x00]));
        }
        other => panic!("expected a response, got {:?}", other),
    }

    read(&mut server, h, 5);
    assert_eq!(last_status(&server), GattStatus(0x07));
}

#[test]
fn read_without_producer_falls_back_to_store() {
    let mut server = advertising_server();
    connect(&mut server);
    server.update_value(&[4, 3, 2, 1], &CHAR_HUMIDITY, &SERVICE_UUID);

    let h = handle(&server, HUM_VALUE);
    read(&mut server, h, 0);
    match server.stack().last_response() {
        Some(StackCall::Response { status, value, .. }) => {
            assert_eq!(*status, GattStatus::OK);
            assert_eq!(value.clone(), Some((h, vec![4, 3, 2, 1])));
        }
        other => panic!("expected a response, got {:?}", other),
    }
}

#[test]
fn cccd_read_returns_stored_subscription() {
    let mut server = advertising_server();
    connect(&mut server);
    let cccd = handle(&server, UV_CCCD);
    write(&mut server, cccd, &CCCD_NOTIFY);

    read(&mut server, cccd, 0);
    match server.stack().last_response() {
        Some(StackCall::Response { value, .. }) => {
            assert_eq!(value.clone(), Some((cccd, CCCD_NOTIFY.to_vec())));
        }
        other => panic!("expected a response, got {:?}", other),
    }

    // Temperature is untouched by the UV subscription.
    assert!(server.layout().find(&CHAR_TEMPERATURE, &SERVICE_UUID).is_some());
}
