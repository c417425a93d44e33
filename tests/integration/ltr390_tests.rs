//! LTR390 driver against the register-backed fake bus.

use weathernode::i2c::I2cError;
use weathernode::sensors::ltr390::{
    DEVICE_ADDRESS, Gain, Ltr390, Ltr390Error, MeasurementRate, Mode, Resolution,
};

use super::mock_hw::{BusOp, FakeI2c};

const MAIN_CTRL: u8 = 0x00;
const MEAS_RATE: u8 = 0x04;
const GAIN: u8 = 0x05;
const ALS_DATA: u8 = 0x0D;
const UVS_DATA: u8 = 0x10;

#[test]
fn setup_writes_gain_and_resolution_then_reads_them_back() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    sensor.setup().unwrap();

    assert_eq!(
        bus.ops(),
        vec![
            BusOp::Write { addr: DEVICE_ADDRESS, bytes: vec![GAIN, 0x04] },
            BusOp::WriteRead { addr: DEVICE_ADDRESS, write: vec![GAIN], len: 1 },
            BusOp::Write { addr: DEVICE_ADDRESS, bytes: vec![MEAS_RATE, 0x00] },
            BusOp::WriteRead { addr: DEVICE_ADDRESS, write: vec![MEAS_RATE], len: 1 },
        ]
    );
    let state = sensor.state();
    assert_eq!(state.gain, Gain::Eighteen);
    assert_eq!(state.resolution, Resolution::TwentyBit);
}

#[test]
fn resolution_and_rate_share_one_register() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    sensor.write_measurement_rate(MeasurementRate::OneSecond).unwrap();
    sensor.write_resolution(Resolution::SixteenBit).unwrap();

    // Resolution in bits 6:4, rate in bits 2:0, neither clobbers the other.
    assert_eq!(bus.register(DEVICE_ADDRESS, MEAS_RATE), Some(vec![0x45]));
    assert_eq!(sensor.read_resolution().unwrap(), Resolution::SixteenBit);
    assert_eq!(sensor.read_measurement_rate().unwrap(), MeasurementRate::OneSecond);

    sensor.write_measurement_rate(MeasurementRate::FiftyMs).unwrap();
    assert_eq!(bus.register(DEVICE_ADDRESS, MEAS_RATE), Some(vec![0x41]));
}

#[test]
fn read_back_refreshes_the_cache_used_for_merging() {
    let bus = FakeI2c::new();
    bus.set_register(DEVICE_ADDRESS, MEAS_RATE, &[0x23]);
    let mut sensor = Ltr390::new(&bus);

    assert_eq!(sensor.read_measurement_rate().unwrap(), MeasurementRate::TwoHundredMs);
    sensor.write_resolution(Resolution::NineteenBit).unwrap();

    assert_eq!(bus.register(DEVICE_ADDRESS, MEAS_RATE), Some(vec![0x13]));
}

#[test]
fn mode_switch_sets_only_mode_and_enable_bits() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    sensor.setup_in_als_mode().unwrap();
    assert_eq!(bus.register(DEVICE_ADDRESS, MAIN_CTRL), Some(vec![0x02]));
    assert_eq!(sensor.read_mode().unwrap(), Mode::Als);

    sensor.setup_in_uv_mode().unwrap();
    assert_eq!(bus.register(DEVICE_ADDRESS, MAIN_CTRL), Some(vec![0x0A]));
    assert_eq!(sensor.read_mode().unwrap(), Mode::Uv);
    assert!(sensor.state().light_sensor_enabled);

    sensor.write_mode(Mode::Uv, false).unwrap();
    assert_eq!(bus.register(DEVICE_ADDRESS, MAIN_CTRL), Some(vec![0x08]));
    sensor.read_mode().unwrap();
    assert!(!sensor.state().light_sensor_enabled);
}

#[test]
fn luminosity_uses_configured_gain_and_resolution() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);
    sensor.setup().unwrap();

    // 2880 counts at gain 18, 20-bit (factor 4): 0.6 * 2880 / 72
    bus.set_register(DEVICE_ADDRESS, ALS_DATA, &[0x40, 0x0B, 0x00]);
    assert_eq!(sensor.read_raw_luminosity().unwrap(), 2880);
    assert!((sensor.read_luminosity().unwrap() - 24.0).abs() < 1e-9);

    sensor.write_gain(Gain::Three).unwrap();
    sensor.write_resolution(Resolution::EighteenBit).unwrap();
    assert!((sensor.read_luminosity().unwrap() - 576.0).abs() < 1e-9);
}

#[test]
fn uv_index_divides_by_sensitivity() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    bus.set_register(DEVICE_ADDRESS, UVS_DATA, &[0xF4, 0x1A, 0x00]);
    assert_eq!(sensor.read_raw_uv().unwrap(), 6900);
    assert!((sensor.read_uv_index().unwrap() - 3.0).abs() < 1e-9);

    bus.set_register(DEVICE_ADDRESS, UVS_DATA, &[0x00, 0x00, 0x00]);
    assert_eq!(sensor.read_uv_index().unwrap(), 0.0);
}

#[test]
fn undecodable_register_values_are_invalid_data() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    bus.set_register(DEVICE_ADDRESS, GAIN, &[0x07]);
    assert_eq!(sensor.read_gain(), Err(Ltr390Error::InvalidData));

    bus.set_register(DEVICE_ADDRESS, MEAS_RATE, &[0x60]);
    assert_eq!(sensor.read_resolution(), Err(Ltr390Error::InvalidData));

    bus.set_register(DEVICE_ADDRESS, MEAS_RATE, &[0x07]);
    assert_eq!(sensor.read_measurement_rate(), Err(Ltr390Error::InvalidData));
}

#[test]
fn short_data_read_is_rejected() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    bus.set_register(DEVICE_ADDRESS, ALS_DATA, &[0x01, 0x02]);
    assert_eq!(sensor.read_raw_luminosity(), Err(Ltr390Error::InvalidDataLength));
}

#[test]
fn bus_failures_are_tagged_by_direction() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    bus.fail_writes(Some(I2cError::Fail));
    assert_eq!(sensor.write_gain(Gain::Nine), Err(Ltr390Error::I2cWriteError(I2cError::Fail)));
    // A failed write leaves the cache untouched.
    assert_eq!(sensor.state().gain, Gain::One);
    bus.fail_writes(None);

    bus.fail_reads(Some(I2cError::Timeout));
    assert_eq!(sensor.read_raw_uv(), Err(Ltr390Error::I2cReadError(I2cError::Timeout)));
    assert!(matches!(
        weathernode::Error::from(sensor.read_gain().unwrap_err()),
        weathernode::Error::Light(Ltr390Error::I2cReadError(I2cError::Timeout))
    ));
}

#[test]
fn every_gain_and_resolution_round_trips_through_the_bus() {
    let bus = FakeI2c::new();
    let mut sensor = Ltr390::new(&bus);

    for gain in Gain::ALL {
        sensor.write_gain(gain).unwrap();
        assert_eq!(sensor.read_gain().unwrap(), gain);
    }
    for resolution in Resolution::ALL {
        sensor.write_resolution(resolution).unwrap();
        assert_eq!(sensor.read_resolution().unwrap(), resolution);
    }
}
