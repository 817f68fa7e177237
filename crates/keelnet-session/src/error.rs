//! Error types for the session layer.

use keelnet_protocol::{ConnectionId, SessionId};

/// Errors that can occur while binding or releasing sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection already logged in. A connection gets one session
    /// for its whole lifetime.
    #[error("{conn} is already authenticated as {session}")]
    AlreadyAuthenticated {
        conn: ConnectionId,
        session: SessionId,
    },

    /// No session is bound to the connection.
    /// This happens when a connection closes without ever logging in.
    #[error("no session bound to {0}")]
    NotFound(ConnectionId),
}
