//! Fixed-layout 256-byte configuration record.
//!
//! `ReadConfiguration` returns the controller's whole parameter block as
//! one raw buffer. The layout is strictly left-to-right at fixed offsets
//! and every multi-byte number is little-endian; [`SystemConfigurationRaw`]
//! mirrors the wire bytes and [`SystemConfigurationRecord`] is the typed
//! view handed to consumers. Constructed once per successful read,
//! immutable afterwards.

use crate::constants::CONFIG_RECORD_SIZE;
use crate::crypto::checksum16;
use crate::error::WeldError;
use chrono::NaiveDate;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{I16, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Keypad language stored in the configuration triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Language {
    German = 0,
    English = 1,
    French = 2,
    Spanish = 3,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// What the lock code protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum LockType {
    None = 0,
    Keypad = 1,
    Full = 2,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Byte-for-byte view of the wire record. Field order is the wire order;
/// the struct must stay exactly 256 bytes.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SystemConfigurationRaw {
    pub device_type: u8,
    pub keypad: u8,
    pub language: u8,
    pub adc_offset: I16,
    pub serial_number: [u8; 12],
    pub free1: [u8; 8],
    pub owner_name1: [u8; 21],
    pub owner_name2: [u8; 21],
    pub owner_name3: [u8; 21],
    // Dates are raw day, month, year-since-2000 triples.
    pub date_manufacture: [u8; 3],
    pub date_calibration: [u8; 3],
    pub date_service: [u8; 3],
    pub cal_voltage_high: [U16; 8],
    pub cal_voltage_low: [U16; 8],
    pub cal_adc_high: [U16; 8],
    pub cal_adc_low: [U16; 8],
    pub free2: [u8; 8],
    pub meter_reference: [U16; 4],
    pub lock_code: U16,
    pub lock_type: u8,
    pub free3: [u8; 8],
    pub supply_threshold: [U16; 4],
    pub gps_config: u8,
    pub config_register2: U16,
    pub free4: [u8; 9],
    pub reserved_tail: [u8; 46],
    pub stored_checksum: U16,
}

const _: () = assert!(size_of::<SystemConfigurationRaw>() == CONFIG_RECORD_SIZE);

/// Typed, decoded view of the configuration record.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfigurationRecord {
    pub device_type: u8,
    pub keypad: u8,
    pub language: Language,
    /// Signed ADC zero offset.
    pub adc_offset: i16,
    pub serial_number: String,
    pub owner_name: [String; 3],
    pub manufacture_date: Option<NaiveDate>,
    pub calibration_date: Option<NaiveDate>,
    pub service_date: Option<NaiveDate>,
    pub cal_voltage_high: [u16; 8],
    pub cal_voltage_low: [u16; 8],
    pub cal_adc_high: [u16; 8],
    pub cal_adc_low: [u16; 8],
    pub meter_reference: [u16; 4],
    pub lock_code: u16,
    pub lock_type: LockType,
    pub supply_threshold: [u16; 4],
    pub gps_config: u8,
    pub config_register2: u16,
    /// Checksum as stored in the record's last two bytes.
    pub stored_checksum: u16,
    /// Checksum recomputed over the preceding 254 bytes.
    pub computed_checksum: u16,
}

/// Fixed-width ASCII field: decode lossily, trim trailing NULs and
/// whitespace.
fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

/// Raw day/month/year-since-2000 triple. All-zero (and any other
/// impossible combination) decodes to `None`.
fn raw_date(bytes: [u8; 3]) -> Option<NaiveDate> {
    let [day, month, year] = bytes;
    NaiveDate::from_ymd_opt(2000 + year as i32, month as u32, day as u32)
}

fn u16_array<const N: usize>(raw: [U16; N]) -> [u16; N] {
    raw.map(|v| v.get())
}

impl SystemConfigurationRecord {
    /// Decode a configuration buffer. Consumes exactly the first 256
    /// bytes; anything shorter is an error, anything on top (the framer
    /// can hand over a trailing fragment) is ignored.
    ///
    /// The stored checksum is decoded but deliberately not enforced:
    /// fielded units ship records whose trailing checksum was never
    /// rewritten after factory calibration. `checksum_ok` exposes the
    /// comparison to callers that want it.
    pub fn decode(buf: &[u8]) -> Result<Self, WeldError> {
        if buf.len() < CONFIG_RECORD_SIZE {
            return Err(WeldError::InsufficientData {
                expected: CONFIG_RECORD_SIZE,
                actual: buf.len(),
            });
        }
        let raw = SystemConfigurationRaw::ref_from_bytes(&buf[..CONFIG_RECORD_SIZE])
            .map_err(|_| WeldError::MalformedResponse("configuration record misaligned".into()))?;

        Ok(Self {
            device_type: raw.device_type,
            keypad: raw.keypad,
            language: Language::from_primitive(raw.language),
            adc_offset: raw.adc_offset.get(),
            serial_number: ascii_field(&raw.serial_number),
            owner_name: [
                ascii_field(&raw.owner_name1),
                ascii_field(&raw.owner_name2),
                ascii_field(&raw.owner_name3),
            ],
            manufacture_date: raw_date(raw.date_manufacture),
            calibration_date: raw_date(raw.date_calibration),
            service_date: raw_date(raw.date_service),
            cal_voltage_high: u16_array(raw.cal_voltage_high),
            cal_voltage_low: u16_array(raw.cal_voltage_low),
            cal_adc_high: u16_array(raw.cal_adc_high),
            cal_adc_low: u16_array(raw.cal_adc_low),
            meter_reference: u16_array(raw.meter_reference),
            lock_code: raw.lock_code.get(),
            lock_type: LockType::from_primitive(raw.lock_type),
            supply_threshold: u16_array(raw.supply_threshold),
            gps_config: raw.gps_config,
            config_register2: raw.config_register2.get(),
            stored_checksum: raw.stored_checksum.get(),
            computed_checksum: checksum16(&buf[..CONFIG_RECORD_SIZE - 2]),
        })
    }

    /// Whether the trailing checksum matches the preceding 254 bytes.
    pub fn checksum_ok(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}
