//! Fixture tests for the two response payload decoders.

use chrono::NaiveDate;
use weldlink_lib::config::{Language, LockType, SystemConfigurationRecord};
use weldlink_lib::crypto::checksum16;
use weldlink_lib::telemetry::parse_telemetry;

/// A plausible factory-fresh record: serial number, owner line, dates,
/// flat calibration tables, and a correct trailing checksum.
fn sample_record() -> Vec<u8> {
    let mut buf = vec![0u8; 256];
    buf[0] = 2; // device type
    buf[1] = 1; // keypad
    buf[2] = 1; // English
    buf[3..5].copy_from_slice(&(-17i16).to_le_bytes());
    buf[5..13].copy_from_slice(b"WN240815");
    buf[25..37].copy_from_slice(b"ACME WELDING");
    buf[88..91].copy_from_slice(&[15, 8, 24]); // 2024-08-15
    for i in 0..8 {
        let off = 97 + i * 2;
        buf[off..off + 2].copy_from_slice(&(1000 + i as u16).to_le_bytes());
    }
    buf[177..179].copy_from_slice(&1234u16.to_le_bytes());
    buf[179] = 1; // keypad lock
    buf[196] = 1; // GPS fitted
    let crc = checksum16(&buf[..254]);
    buf[254..].copy_from_slice(&crc.to_le_bytes());
    buf
}

#[test]
fn sample_record_decodes_field_by_field() {
    let rec = SystemConfigurationRecord::decode(&sample_record()).unwrap();
    assert_eq!(rec.device_type, 2);
    assert_eq!(rec.language, Language::English);
    assert_eq!(rec.adc_offset, -17);
    assert_eq!(rec.serial_number, "WN240815");
    assert_eq!(rec.owner_name[0], "ACME WELDING");
    assert_eq!(rec.manufacture_date, NaiveDate::from_ymd_opt(2024, 8, 15));
    assert_eq!(rec.cal_voltage_high[0], 1000);
    assert_eq!(rec.cal_voltage_high[7], 1007);
    assert_eq!(rec.lock_code, 1234);
    assert_eq!(rec.lock_type, LockType::Keypad);
    assert_eq!(rec.gps_config, 1);
    assert!(rec.checksum_ok());
}

#[test]
fn decode_is_idempotent() {
    let buf = sample_record();
    let a = SystemConfigurationRecord::decode(&buf).unwrap();
    let b = SystemConfigurationRecord::decode(&buf).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unknown_language_and_lock_bytes_survive() {
    let mut buf = vec![0u8; 256];
    buf[2] = 0x7F;
    buf[179] = 0x7F;
    let rec = SystemConfigurationRecord::decode(&buf).unwrap();
    assert_eq!(rec.language, Language::Unknown(0x7F));
    assert_eq!(rec.lock_type, LockType::Unknown(0x7F));
}

#[test]
fn telemetry_full_line_with_coefficients() {
    let line = "U:23.40;I:12.70;ADCU:1A2B;ADCI:0C3D;C1:1012;C2:998;C3:1005;C4:1001;C5:997;C6:1003;C7:1000;C8:999";
    let t = parse_telemetry(line);
    assert_eq!(t.voltage, 23.40);
    assert_eq!(t.current, 12.70);
    assert_eq!(t.adc_voltage, 0x1A2B);
    assert_eq!(t.adc_current, 0x0C3D);
    assert_eq!(t.coefficients, [1012, 998, 1005, 1001, 997, 1003, 1000, 999]);
}

#[test]
fn telemetry_tolerates_device_quirks() {
    // Comma decimals, a stray empty segment, and a colonless fragment.
    let t = parse_telemetry("U:23,4;;BAD;I:0,9;ADCU:00FF");
    assert_eq!(t.voltage, 23.4);
    assert_eq!(t.current, 0.9);
    assert_eq!(t.adc_voltage, 0x00FF);
}
