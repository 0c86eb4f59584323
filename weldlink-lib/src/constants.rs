// Wire-level constants for the WELD-CTRL command set.
//
// Everything in this file is a compatibility contract with the controller
// firmware. Do not change values without a firmware capture proving the
// device moved.

use std::time::Duration;

/// Every command frame is exactly this many bytes, terminator included.
pub const FRAME_LEN: usize = 30;

/// Offset of the big-endian 16-bit checksum inside a frame.
pub const CHECKSUM_OFFSET: usize = 26;

/// The stream cipher covers bytes `[CIPHER_START, CIPHER_END)` of a frame,
/// checksum included. The mode marker and first opcode byte stay readable
/// so the firmware can pick the right decode path.
pub const CIPHER_START: usize = 2;
pub const CIPHER_END: usize = 28;

/// Frame terminator, also the response delimiter.
pub const TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Mode marker in byte 0: ciphered variant of the opcode.
pub const MODE_ENCRYPTED: u8 = b'#';
/// Mode marker in byte 0: plaintext variant. The firmware accepts both.
pub const MODE_PLAIN: u8 = b'%';

/// Shared ASCII secret baked into the controller firmware.
pub const CIPHER_KEY: &[u8] = b"TW40-PROTOKOLL-A7";

/// Filler byte for all opcodes except Identify.
pub const FILLER: u8 = b'X';

/// Substring answering the Identify probe on first-generation units.
pub const LEGACY_DEVICE_MARKER: &str = "WELD-CTRL";
/// Substring answering on the current-generation units.
pub const NEW_DEVICE_MARKER: &str = "WELD-NG:";
/// Byte offset of the one-character sub-version in a new-unit response
/// (the character right after the `WELD-NG:` marker prefix).
pub const NEW_DEVICE_VERSION_OFFSET: usize = 8;

/// Factory address of the serial-to-Ethernet tunnel device.
pub const DEFAULT_TUNNEL_HOST: &str = "192.168.1.126";
pub const DEFAULT_TUNNEL_PORT: u16 = 8234;

/// Baud rates the controller ships with, in scan order.
pub const BAUD_CANDIDATES: [u32; 2] = [19_200, 115_200];

/// Attempts per (port, baud) pair during a full scan.
pub const ATTEMPTS_PER_CANDIDATE: u32 = 2;

/// Inter-byte silence window that ends a response without a delimiter.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(2000);

/// Network read path: attempts per operation and the pause between them.
pub const NETWORK_RETRY_ATTEMPTS: u32 = 3;
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// TCP connect deadline for the tunnel device.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Serial write deadline (reads are governed by the silence window).
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// Quiet period required on both sides of the `+++` escape when entering
/// the tunnel's AT command mode.
pub const AT_GUARD_TIME: Duration = Duration::from_millis(1100);

/// Shorter silence window for AT command replies (the tunnel answers fast).
pub const AT_SILENCE_WINDOW: Duration = Duration::from_millis(500);

/// Size of the configuration record returned by `ReadConfiguration`.
pub const CONFIG_RECORD_SIZE: usize = 256;
