//! Error types for the protocol layer.
//!
//! Two enums live here because they fail in different places:
//! [`FrameError`] covers the byte-level frame codec (integrity, cipher,
//! truncation), while [`ProtocolError`] covers the JSON payloads carried
//! inside a frame and the message catalog.

/// Errors produced while encoding or decoding a single frame.
///
/// Every variant is scoped to ONE frame. The connection engines drop the
/// frame, log it, and keep reading: framing already consumed exactly
/// `total_size` bytes, so the stream stays in sync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The CRC recomputed over the decrypted body does not match the
    /// header's `crc` field.
    #[error("frame integrity check failed: header crc {expected:#010x}, computed {actual:#010x}")]
    IntegrityFailure {
        /// The value carried in the header.
        expected: u32,
        /// The value computed from the decrypted body.
        actual: u32,
    },

    /// The encrypted body could not be decrypted (bad length or padding).
    #[error("frame decrypt failed")]
    DecryptFailure,

    /// The buffer is shorter than the header claims.
    #[error("frame truncated: header says {expected} bytes, buffer holds {actual}")]
    Truncated {
        /// Bytes announced by `total_size`.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The decrypted body is not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8,

    /// The encoded frame does not fit the 32-bit `total_size` field.
    #[error("frame too large to encode: {0} bytes")]
    TooLarge(usize),
}

/// Errors in the payload / message-catalog layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a message payload to JSON failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Parsing a frame's JSON payload failed.
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame carries a message id outside the catalog.
    #[error("unknown message id {0}")]
    UnknownMessage(u16),
}
