//! Command frame construction.
//!
//! Every operation on the controller is a fixed 30-byte frame:
//!
//! ```text
//! [0]      mode marker ('#' ciphered / '%' plaintext)
//! [1..3)   opcode bytes
//! [3..26)  filler ('X', or the 1..5 digit cycle for Identify)
//! [26..28) checksum16 over [0..26), big-endian, computed on plaintext
//! [28..30) CR LF
//! ```
//!
//! When encryption is on, bytes `[2..28)` are stream-ciphered in place
//! after the checksum is written. Builders are pure functions of the
//! encryption flag and are tested byte-exact.

use crate::constants::{
    CHECKSUM_OFFSET, CIPHER_END, CIPHER_KEY, CIPHER_START, FILLER, FRAME_LEN, MODE_ENCRYPTED,
    MODE_PLAIN, TERMINATOR,
};
use crate::crypto::{checksum16, stream_cipher};
use strum_macros::Display;

/// The controller's fixed command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Command {
    /// Presence probe used during discovery.
    Identify,
    /// Fetch the 256-byte configuration record.
    ReadConfiguration,
    /// Ask the unit for its type string.
    TypeQuery,
    /// Fetch the lifetime weld counter.
    ReadWeldCount,
    /// Fetch the live telemetry line.
    ReadWeldParameters,
}

impl Command {
    /// Two-byte opcode written at frame offsets 1 and 2.
    fn opcode(self) -> [u8; 2] {
        match self {
            Command::Identify => *b"ID",
            Command::ReadConfiguration => *b"RC",
            Command::TypeQuery => *b"TQ",
            Command::ReadWeldCount => *b"WN",
            Command::ReadWeldParameters => *b"WP",
        }
    }

    /// Assemble the wire frame for this command.
    pub fn build(self, encrypt: bool) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = if encrypt { MODE_ENCRYPTED } else { MODE_PLAIN };
        frame[1..3].copy_from_slice(&self.opcode());

        match self {
            // Identify fills with a repeating 1..5 digit cycle; the
            // firmware uses it as a cheap line-quality pattern.
            Command::Identify => {
                for (i, slot) in frame[3..CHECKSUM_OFFSET].iter_mut().enumerate() {
                    *slot = b'1' + (i % 5) as u8;
                }
            }
            _ => {
                for slot in frame[3..CHECKSUM_OFFSET].iter_mut() {
                    *slot = FILLER;
                }
            }
        }

        let crc = checksum16(&frame[..CHECKSUM_OFFSET]);
        frame[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&crc.to_be_bytes());

        if encrypt {
            stream_cipher(&mut frame[CIPHER_START..CIPHER_END], CIPHER_KEY);
        }

        frame[FRAME_LEN - 2..].copy_from_slice(&TERMINATOR);
        frame
    }

    /// All commands, used by fixture tests and the frame-dump tooling.
    pub const ALL: [Command; 5] = [
        Command::Identify,
        Command::ReadConfiguration,
        Command::TypeQuery,
        Command::ReadWeldCount,
        Command::ReadWeldParameters,
    ];
}
