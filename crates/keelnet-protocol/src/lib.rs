//! Wire protocol for Keelnet.
//!
//! This crate defines everything two peers must agree on byte-for-byte:
//!
//! - **Header** ([`Header`]): the 16-byte cleartext prefix whose
//!   `total_size` drives de-framing.
//! - **Checksum** ([`checksum`]): chained CRC32 over the plaintext body.
//! - **Cipher** ([`CipherKey`]): AES-128-ECB/PKCS7 under an embedded key.
//! - **Frame codec** ([`FrameCodec`], [`Frame`]): the encode/decode
//!   pipeline tying those together.
//! - **Message catalog** ([`Message`], [`MessageId`]): the JSON payloads
//!   carried inside frames.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets. Transport hands it
//! exactly one frame's worth of bytes and gets a [`Frame`] back.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame → Message) → Dispatcher (session, room)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod checksum;
mod cipher;
mod error;
mod frame;
mod header;
mod message;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use cipher::{BLOCK_SIZE, CipherKey, derive_iv};
pub use error::{FrameError, ProtocolError};
pub use frame::{Frame, FrameCodec};
pub use header::{HEADER_SIZE, Header, MAGIC, TOTAL_SIZE_OFFSET, peek_total_size};
pub use message::{
    ERROR_ALREADY_AUTHENTICATED, ERROR_NONE, EnterRoom, LoginRequest, LoginResponse, Message,
    MessageId, PingRequest, PingResponse,
};
pub use types::{ConnectionId, RoomNumber, SessionId, UserId};
