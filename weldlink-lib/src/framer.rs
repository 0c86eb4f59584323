//! Delimiter-or-silence response framing.
//!
//! The controller terminates well-formed responses with CR LF, but
//! malformed or partial ones just trail off. Accumulate bytes until the
//! last two are CR,LF (delimiter found, terminator stripped) or until no
//! new byte arrives within the silence window (raw accumulation returned
//! untrimmed). Callers get the flag and elapsed time for diagnostics.

use crate::constants::TERMINATOR;
use crate::error::WeldError;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::time::{Instant, timeout};

/// One framed response off the wire.
#[derive(Debug, Clone)]
pub struct FramedResponse {
    pub bytes: Bytes,
    /// True when the CR LF delimiter ended the response (and was stripped).
    pub delimiter_found: bool,
    pub elapsed: Duration,
}

impl FramedResponse {
    /// Lossy text view for marker checks and the diagnostic log.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

/// Read one response from an already-connected transport.
pub async fn read_response(
    transport: &mut (impl Transport + ?Sized),
    silence: Duration,
) -> Result<FramedResponse, WeldError> {
    let started = Instant::now();
    let mut acc = BytesMut::with_capacity(64);
    let mut chunk = [0u8; 256];

    loop {
        match timeout(silence, transport.recv_chunk(&mut chunk)).await {
            // Inter-byte silence window expired: hand back the raw
            // accumulation, untrimmed.
            Err(_) => {
                return Ok(FramedResponse {
                    bytes: acc.freeze(),
                    delimiter_found: false,
                    elapsed: started.elapsed(),
                });
            }
            Ok(Err(e)) => return Err(e),
            // A zero-length read means the link has nothing more to give.
            Ok(Ok(0)) => {
                return Ok(FramedResponse {
                    bytes: acc.freeze(),
                    delimiter_found: false,
                    elapsed: started.elapsed(),
                });
            }
            Ok(Ok(n)) => {
                acc.extend_from_slice(&chunk[..n]);
                if acc.len() >= 2 && acc[acc.len() - 2..] == TERMINATOR {
                    acc.truncate(acc.len() - 2);
                    return Ok(FramedResponse {
                        bytes: acc.freeze(),
                        delimiter_found: true,
                        elapsed: started.elapsed(),
                    });
                }
            }
        }
    }
}
