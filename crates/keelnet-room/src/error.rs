//! Error types for the room layer.

use keelnet_protocol::{RoomNumber, UserId};

/// Errors that can occur during room assignment.
///
/// Neither is fatal to a connection; the server logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The user has no room. Raised by `exit_user` for a user that never
    /// entered, or already left.
    #[error("user {0} is not in any room")]
    NotInAnyRoom(UserId),

    /// The user already has a room. A user is in at most ONE room.
    #[error("user {0} already in room {1}")]
    AlreadyInRoom(UserId, RoomNumber),
}
