//! Identity types shared by every Keelnet crate.
//!
//! All of these are "newtype wrappers" around a primitive. Two ids that
//! are both `u64` underneath (a session and a user, say) can't be mixed
//! up by accident, and signatures like `fn exit_user(user: UserId)` read
//! clearly.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Opaque identifier for one accepted (or dialed) TCP connection.
///
/// Issued from a per-listener counter, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A session issued to a connection after a successful login.
///
/// `0` is reserved for "not logged in". The value carries no authority of
/// its own; it only feeds the per-frame IV derivation.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire
/// (`"session": 3`, not `"session": {"0": 3}`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// The unauthenticated session.
    pub const NONE: SessionId = SessionId(0);

    /// Returns `true` once a login has bound a real session.
    pub fn is_authenticated(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// A logged-in user as seen by the matchmaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

impl From<ConnectionId> for UserId {
    fn from(id: ConnectionId) -> Self {
        UserId(id.into_inner())
    }
}

// ---------------------------------------------------------------------------
// RoomNumber
// ---------------------------------------------------------------------------

/// Room numbers are handed out 1, 2, 3, ... in creation order.
///
/// `i32` because that is what the `EnterRoom` notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomNumber(pub i32);

impl fmt::Display for RoomNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}
