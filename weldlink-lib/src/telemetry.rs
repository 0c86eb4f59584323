//! Telemetry line decoding.
//!
//! `ReadWeldParameters` answers with an ASCII line of `;`-separated
//! `KEY:VALUE` pairs, e.g.
//!
//! ```text
//! U:23.40;I:12.70;ADCU:1A2B;ADCI:0C3D;C1:1012;...;C8:998
//! ```
//!
//! Unknown keys are ignored and malformed segments are skipped; the
//! device occasionally emits partial lines and a lost field must not
//! sink the whole snapshot.

use tracing::debug;

/// One parsed telemetry snapshot. Built fresh per successful read,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeldTelemetry {
    /// Weld voltage in volts.
    pub voltage: f64,
    /// Weld current in amperes.
    pub current: f64,
    /// Raw ADC code behind the voltage channel.
    pub adc_voltage: u16,
    /// Raw ADC code behind the current channel.
    pub adc_current: u16,
    /// Calibration coefficients C1..C8 echoed by the firmware.
    pub coefficients: [u16; 8],
}

/// Locale-tolerant decimal parse: the firmware emits `.` or `,` as the
/// fraction separator depending on its language setting.
fn parse_flexible_float(value: &str) -> Option<f64> {
    value.trim().replace(',', ".").parse().ok()
}

/// Parse a telemetry line. Total: every malformed segment is skipped,
/// missing fields stay at their zero defaults.
pub fn parse_telemetry(line: &str) -> WeldTelemetry {
    let mut snapshot = WeldTelemetry::default();

    for segment in line.trim().split(';') {
        // A valid segment carries exactly one `:`.
        let mut parts = segment.split(':');
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(v), None) => (k.trim(), v.trim()),
            _ => {
                if !segment.is_empty() {
                    debug!("skipping malformed telemetry segment {segment:?}");
                }
                continue;
            }
        };

        match key {
            "U" => {
                if let Some(v) = parse_flexible_float(value) {
                    snapshot.voltage = v;
                }
            }
            "I" => {
                if let Some(v) = parse_flexible_float(value) {
                    snapshot.current = v;
                }
            }
            "ADCU" => {
                if let Ok(v) = u16::from_str_radix(value, 16) {
                    snapshot.adc_voltage = v;
                }
            }
            "ADCI" => {
                if let Ok(v) = u16::from_str_radix(value, 16) {
                    snapshot.adc_current = v;
                }
            }
            _ => {
                if let Some(idx) = key
                    .strip_prefix('C')
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| (1..=8).contains(n))
                {
                    if let Ok(v) = value.parse() {
                        snapshot.coefficients[idx - 1] = v;
                    }
                }
                // Anything else is an unknown key; ignore it.
            }
        }
    }

    snapshot
}
