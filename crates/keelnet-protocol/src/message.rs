//! The message catalog: every payload a Keelnet peer understands.
//!
//! On the wire a message is just a `u16` id plus a JSON string. This module
//! turns that pair into a closed enum, [`Message`], so the dispatcher can
//! `match` on it exhaustively. Adding a message means adding a variant, and
//! the compiler then points at every `match` that has to handle it.
//!
//! ## Pairing rule
//!
//! A response always carries `request id + 1`. [`MessageId::response`]
//! encodes that, so neither peer needs a lookup table.
//!
//! | id | name          | direction        | payload                          |
//! |----|---------------|------------------|----------------------------------|
//! | 1  | Login         | client → server  | `{"id": string}`                 |
//! | 2  | LoginResponse | server → client  | `{"session": u64, "error": i32}` |
//! | 3  | Ping          | client → server  | `{}`                             |
//! | 4  | PingResponse  | server → client  | `{"error": i32, "text": string}` |
//! | 5  | EnterRoom     | server → client  | `{"roomNumber": i32}`            |

use serde::{Deserialize, Serialize};

use crate::{Frame, ProtocolError, RoomNumber, SessionId};

/// `error` value for a successful response.
pub const ERROR_NONE: i32 = 0;

/// `error` value for a login on a connection that already holds a session.
pub const ERROR_ALREADY_AUTHENTICATED: i32 = 1;

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Numeric message ids as they appear in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageId {
    Login = 1,
    LoginResponse = 2,
    Ping = 3,
    PingResponse = 4,
    EnterRoom = 5,
}

impl MessageId {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Login),
            2 => Some(Self::LoginResponse),
            3 => Some(Self::Ping),
            4 => Some(Self::PingResponse),
            5 => Some(Self::EnterRoom),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// The id of the reply to this request, or `None` if this id is not a
    /// request.
    pub fn response(self) -> Option<Self> {
        match self {
            Self::Login | Self::Ping => Self::from_u16(self.as_u16() + 1),
            Self::LoginResponse | Self::PingResponse | Self::EnterRoom => None,
        }
    }

    /// `true` for ids only a server ever sends.
    pub fn is_server_to_client(self) -> bool {
        matches!(
            self,
            Self::LoginResponse | Self::PingResponse | Self::EnterRoom
        )
    }
}

impl TryFrom<u16> for MessageId {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::from_u16(raw).ok_or(ProtocolError::UnknownMessage(raw))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Login request. `id` is the user's chosen name; it is not verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session: SessionId,
    pub error: i32,
}

/// Ping carries nothing; it serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {}

/// `text` is a fixed-size filler so the round trip measures a realistic
/// frame, not an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub error: i32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterRoom {
    pub room_number: RoomNumber,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every message in the catalog, keyed by its [`MessageId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Login(LoginRequest),
    LoginResponse(LoginResponse),
    Ping(PingRequest),
    PingResponse(PingResponse),
    EnterRoom(EnterRoom),
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::Login(_) => MessageId::Login,
            Message::LoginResponse(_) => MessageId::LoginResponse,
            Message::Ping(_) => MessageId::Ping,
            Message::PingResponse(_) => MessageId::PingResponse,
            Message::EnterRoom(_) => MessageId::EnterRoom,
        }
    }

    /// Serializes the payload (without the id) to JSON.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if serde fails, which for these plain
    /// structs only happens on allocation failure.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let json = match self {
            Message::Login(p) => serde_json::to_string(p),
            Message::LoginResponse(p) => serde_json::to_string(p),
            Message::Ping(p) => serde_json::to_string(p),
            Message::PingResponse(p) => serde_json::to_string(p),
            Message::EnterRoom(p) => serde_json::to_string(p),
        };
        json.map_err(ProtocolError::Encode)
    }

    /// The `(message_id, json)` pair a connection's send queue takes.
    pub fn to_parts(&self) -> Result<(u16, String), ProtocolError> {
        Ok((self.id().as_u16(), self.to_json()?))
    }

    /// Parses a JSON payload for the given raw id.
    pub fn decode(message_id: u16, json: &str) -> Result<Self, ProtocolError> {
        let id = MessageId::try_from(message_id)?;
        let message = match id {
            MessageId::Login => Message::Login(parse(json)?),
            MessageId::LoginResponse => Message::LoginResponse(parse(json)?),
            MessageId::Ping => Message::Ping(parse(json)?),
            MessageId::PingResponse => Message::PingResponse(parse(json)?),
            MessageId::EnterRoom => Message::EnterRoom(parse(json)?),
        };
        Ok(message)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        Self::decode(frame.message_id(), frame.payload())
    }
}

fn parse<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(json).map_err(ProtocolError::Decode)
}
