//! CRC32 integrity check over frame bodies.
//!
//! The checksum is the standard reflected CRC32 (polynomial `0xEDB88320`,
//! initial and final inversion). It is *composable*: [`crc32`] takes the
//! previous result as its starting value, so
//!
//! ```text
//! crc32(crc32(crc32(0, a), b), c) == crc32(0, a ‖ b ‖ c)
//! ```
//!
//! The frame codec relies on that to chain the body, the message id and
//! the sequence number into one value without building a joined buffer.

use crc32fast::Hasher;

/// Continues a CRC32 computation over `bytes`.
///
/// Pass `0` to start a fresh checksum, or a previous result to carry it
/// forward across calls.
pub fn crc32(running: u32, bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(running);
    hasher.update(bytes);
    hasher.finalize()
}

/// The value stored in a frame header's `crc` field.
///
/// Covers the *plaintext* body (including its trailing NUL), then the
/// message id, then the sequence number, both little-endian.
pub fn frame_crc(body: &[u8], message_id: u16, sequence: u16) -> u32 {
    let crc = crc32(0, body);
    let crc = crc32(crc, &message_id.to_le_bytes());
    crc32(crc, &sequence.to_le_bytes())
}
