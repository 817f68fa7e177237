//! Frame codec: `(message_id, sequence, json)` to wire bytes and back.
//!
//! ## Encode pipeline
//!
//! ```text
//! json ─► json ‖ NUL ─► frame_crc ─┐
//!              │                   ▼
//!              └──► AES-ECB ─► header(magic, id, seq, 16+len, crc) ‖ ciphertext
//! ```
//!
//! ## Decode pipeline
//!
//! The caller hands over a buffer that holds exactly one frame (the
//! de-framer already used `total_size` to cut it out of the stream).
//! Decode decrypts, recomputes the CRC over the *decrypted* body and
//! compares it to the header. Any failure drops this one frame only.

use crate::checksum::frame_crc;
use crate::cipher::CipherKey;
use crate::header::{HEADER_SIZE, Header, MAGIC};
use crate::FrameError;

/// One decoded protocol message.
///
/// Immutable once built. `sequence` is whatever the sender stamped on it;
/// it exists for diagnostics and IV derivation, not for delivery
/// guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_id: u16,
    sequence: u16,
    payload: String,
}

impl Frame {
    pub fn new(message_id: u16, sequence: u16, payload: impl Into<String>) -> Self {
        Self {
            message_id,
            sequence,
            payload: payload.into(),
        }
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The JSON payload with trailing NULs already trimmed.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Encodes and decodes frames under one shared key.
///
/// Cheap to clone; both connection roles keep their own copy.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    key: CipherKey,
}

impl FrameCodec {
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &CipherKey {
        &self.key
    }

    /// Builds the wire bytes for one frame. The returned length is the
    /// frame's `total_size`.
    ///
    /// # Errors
    /// [`FrameError::TooLarge`] if the encrypted frame would not fit the
    /// 32-bit `total_size` field.
    pub fn encode(&self, message_id: u16, sequence: u16, json: &str) -> Result<Vec<u8>, FrameError> {
        let mut body = Vec::with_capacity(json.len() + 1);
        body.extend_from_slice(json.as_bytes());
        body.push(0);

        let crc = frame_crc(&body, message_id, sequence);
        let ciphertext = self.key.encrypt(&body);

        let total = HEADER_SIZE + ciphertext.len();
        let total_size = u32::try_from(total).map_err(|_| FrameError::TooLarge(total))?;

        let header = Header {
            magic: MAGIC,
            message_id,
            sequence,
            total_size,
            crc,
        };

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decodes the frame at the start of `buf`.
    ///
    /// Bytes past `total_size` are ignored.
    pub fn decode(&self, buf: &[u8]) -> Result<Frame, FrameError> {
        let header = Header::parse(buf).ok_or(FrameError::Truncated {
            expected: HEADER_SIZE,
            actual: buf.len(),
        })?;
        let total = header.total_size as usize;
        if total < HEADER_SIZE {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                actual: total,
            });
        }
        if buf.len() < total {
            return Err(FrameError::Truncated {
                expected: total,
                actual: buf.len(),
            });
        }

        let body = self.key.decrypt(&buf[HEADER_SIZE..total])?;

        let actual = frame_crc(&body, header.message_id, header.sequence);
        if actual != header.crc {
            return Err(FrameError::IntegrityFailure {
                expected: header.crc,
                actual,
            });
        }

        let text = std::str::from_utf8(&body).map_err(|_| FrameError::InvalidUtf8)?;
        Ok(Frame::new(
            header.message_id,
            header.sequence,
            text.trim_end_matches('\0'),
        ))
    }
}
