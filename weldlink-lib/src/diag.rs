//! Diagnostic sink seam.
//!
//! The surrounding application owns the append-only log; the library
//! only hands it human-readable lines, one per notable event.

use tracing::info;

pub trait DiagnosticSink: Send + Sync {
    fn event(&self, line: &str);
}

/// Default sink forwarding every line to `tracing`.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn event(&self, line: &str) {
        info!(target: "weldlink::diag", "{line}");
    }
}

/// Hex + printable-ASCII rendering of a frame for the diagnostic log.
pub fn frame_dump(label: &str, bytes: &[u8]) -> String {
    let ascii: String = bytes
        .iter()
        .map(|&b| {
            if (0x20..0x7F).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!("{label} [{} bytes] {} |{}|", bytes.len(), hex::encode(bytes), ascii)
}
