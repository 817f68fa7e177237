//! The session registry: which connection holds which session.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is a plain `HashMap` and is NOT thread-safe by
//! itself. The server keeps it behind a mutex next to its other state and
//! only touches it from the dispatcher, so the lock is never contended by
//! I/O tasks.

use std::collections::HashMap;

use keelnet_protocol::ConnectionId;

use crate::{Session, SessionError};

/// Connection → session bindings.
///
/// A connection is bound at most once. Its session goes away when the
/// connection closes.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session` to `conn`.
    ///
    /// # Errors
    /// [`SessionError::AlreadyAuthenticated`] if the connection already
    /// has a session. The existing binding is left untouched.
    pub fn bind(&mut self, conn: ConnectionId, session: Session) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(&conn) {
            return Err(SessionError::AlreadyAuthenticated {
                conn,
                session: existing.id,
            });
        }

        tracing::info!(%conn, session = %session.id, login = %session.login, "session bound");
        Ok(self.sessions.entry(conn).or_insert(session))
    }

    pub fn get(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn is_bound(&self, conn: ConnectionId) -> bool {
        self.sessions.contains_key(&conn)
    }

    /// Removes and returns the connection's session.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the connection never logged in.
    pub fn release(&mut self, conn: ConnectionId) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .remove(&conn)
            .ok_or(SessionError::NotFound(conn))?;
        tracing::debug!(%conn, session = %session.id, "session released");
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use keelnet_protocol::{SessionId, UserId};

    use super::*;

    fn cid(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn session(n: u64) -> Session {
        Session::new(SessionId(n), format!("user-{n}"), UserId(n))
    }

    #[test]
    fn test_bind_new_connection_returns_session() {
        let mut reg = SessionRegistry::new();
        let bound = reg.bind(cid(1), session(1)).unwrap();
        assert_eq!(bound.id, SessionId(1));
        assert_eq!(bound.login, "user-1");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_bind_twice_returns_error_and_keeps_first() {
        let mut reg = SessionRegistry::new();
        reg.bind(cid(1), session(1)).unwrap();

        let err = reg.bind(cid(1), session(2)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::AlreadyAuthenticated {
                session: SessionId(1),
                ..
            }
        ));
        assert_eq!(reg.get(cid(1)).unwrap().id, SessionId(1));
    }

    #[test]
    fn test_release_removes_binding() {
        let mut reg = SessionRegistry::new();
        reg.bind(cid(1), session(1)).unwrap();

        let released = reg.release(cid(1)).unwrap();
        assert_eq!(released.user, UserId(1));
        assert!(!reg.is_bound(cid(1)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_release_unknown_returns_not_found() {
        let mut reg = SessionRegistry::new();
        assert!(matches!(
            reg.release(cid(9)),
            Err(SessionError::NotFound(c)) if c == cid(9)
        ));
    }

    #[test]
    fn test_rebind_after_release_is_allowed() {
        let mut reg = SessionRegistry::new();
        reg.bind(cid(1), session(1)).unwrap();
        reg.release(cid(1)).unwrap();
        assert!(reg.bind(cid(1), session(2)).is_ok());
    }
}
