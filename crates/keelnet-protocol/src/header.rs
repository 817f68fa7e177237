//! The 16-byte cleartext frame header.
//!
//! ```text
//! offset 0  magic       u32   0xFE1A2B3C
//! offset 4  message_id  u16
//! offset 6  sequence    u16
//! offset 8  total_size  u32   header + encrypted body
//! offset 12 crc         u32   see checksum::frame_crc
//! ```
//!
//! All fields are little-endian. `total_size` is the only thing the
//! de-framer needs, so it also gets a standalone [`peek_total_size`].

/// Header length in bytes.
pub const HEADER_SIZE: usize = 16;

/// Protocol sentinel written at offset 0.
///
/// Decoding does not reject a different value; [`Header::magic`] is exposed
/// so a caller can check it if it wants to.
pub const MAGIC: u32 = 0xFE1A_2B3C;

/// Byte offset of the `total_size` field.
pub const TOTAL_SIZE_OFFSET: usize = 8;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub message_id: u16,
    pub sequence: u16,
    pub total_size: u32,
    pub crc: u32,
}

impl Header {
    /// Reads a header from the first 16 bytes of `buf`.
    ///
    /// Returns `None` if fewer than 16 bytes are available.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let h: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            magic: u32::from_le_bytes([h[0], h[1], h[2], h[3]]),
            message_id: u16::from_le_bytes([h[4], h[5]]),
            sequence: u16::from_le_bytes([h[6], h[7]]),
            total_size: u32::from_le_bytes([h[8], h[9], h[10], h[11]]),
            crc: u32::from_le_bytes([h[12], h[13], h[14], h[15]]),
        })
    }

    /// Serializes the header into its 16-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.message_id.to_le_bytes());
        out[6..8].copy_from_slice(&self.sequence.to_le_bytes());
        out[8..12].copy_from_slice(&self.total_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.crc.to_le_bytes());
        out
    }

    /// Body length implied by `total_size`, or `None` if it is below the
    /// header size.
    pub fn body_len(&self) -> Option<usize> {
        (self.total_size as usize).checked_sub(HEADER_SIZE)
    }
}

/// Reads just the `total_size` field, if the header is complete.
pub fn peek_total_size(buf: &[u8]) -> Option<u32> {
    let field = buf.get(TOTAL_SIZE_OFFSET..TOTAL_SIZE_OFFSET + 4)?;
    Some(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}
