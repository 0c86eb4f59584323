//! Checksum and stream cipher shared with the controller firmware.
//!
//! Both routines are bit-exact contracts: the firmware computes the same
//! checksum over the same byte span and runs the same cipher with the same
//! key schedule. Reference vectors live in the tests below.

/// Table-free 16-bit CRC, polynomial feedback 0xA001 applied LSB-first,
/// seeded at 0xFFFF (the CRC-16/MODBUS construction).
pub fn checksum16(buf: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in buf {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Key-scheduled stream cipher (RC4 construction) applied in place.
///
/// Self-inverse: running it twice with the same key restores the input.
/// The keystream starts fresh on every call, so encrypting a frame span
/// and later decrypting the same span line up byte for byte.
pub fn stream_cipher(buf: &mut [u8], key: &[u8]) {
    debug_assert!(!key.is_empty());

    // Key scheduling: permute the 256-byte state with the key.
    let mut state = [0u8; 256];
    for (i, slot) in state.iter_mut().enumerate() {
        *slot = i as u8;
    }
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j
            .wrapping_add(state[i])
            .wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    // Pseudo-random generation: XOR the keystream into the target span.
    let mut i: u8 = 0;
    let mut j: u8 = 0;
    for byte in buf.iter_mut() {
        i = i.wrapping_add(1);
        j = j.wrapping_add(state[i as usize]);
        state.swap(i as usize, j as usize);
        let k = state[(state[i as usize].wrapping_add(state[j as usize])) as usize];
        *byte ^= k;
    }
}
