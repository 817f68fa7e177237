//! Session types: what the server remembers about a logged-in connection.
//!
//! A session records:
//! - WHICH id was issued (`SessionId`, never 0 once bound)
//! - WHO logged in (the `id` string from the login request)
//! - WHICH user the matchmaker knows them as (`UserId`)
//! - WHEN the login happened

use std::time::Instant;

use keelnet_protocol::{SessionId, UserId};

/// The server's record of one authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Issued by [`SessionIssuer`](crate::SessionIssuer).
    pub id: SessionId,

    /// The name the client logged in with. Not verified.
    pub login: String,

    /// Identity handed to room assignment.
    pub user: UserId,

    /// When the session was bound.
    pub bound_at: Instant,
}

impl Session {
    pub fn new(id: SessionId, login: impl Into<String>, user: UserId) -> Self {
        Self {
            id,
            login: login.into(),
            user,
            bound_at: Instant::now(),
        }
    }
}
