//! Server-side message handling.
//!
//! The pump hands every received frame to [`Dispatcher::dispatch`] on its
//! tick, one at a time and in arrival order. A connection's frames are
//! therefore handled strictly FIFO, and a reply is queued before the next
//! frame from the same connection is looked at.
//!
//! The flow for a new client:
//!   1. `Login { id }` → issue a session, bind it, reply `LoginResponse`
//!   2. hand the user to the matchmaker → send `EnterRoom { roomNumber }`
//!   3. `Ping {}` → reply `PingResponse` with the filler text, then a
//!      second, shorter `PingResponse`
//!   4. socket closes → [`Dispatcher::connection_closed`] undoes 1 and 2

use keelnet_protocol::{
    ERROR_ALREADY_AUTHENTICATED, ERROR_NONE, EnterRoom, Frame, LoginRequest, LoginResponse,
    Message, PingResponse, ProtocolError, SessionId, UserId,
};
use keelnet_room::{MatchMaker, RoomConfig};
use keelnet_session::{Session, SessionIssuer, SessionRegistry};
use keelnet_transport::ServerConnection;
use parking_lot::Mutex;

use crate::ServerConfig;

/// Login, ping and room bookkeeping shared by every connection.
pub struct Dispatcher {
    issuer: SessionIssuer,
    sessions: Mutex<SessionRegistry>,
    matchmaker: MatchMaker,
    ping_text: String,
    ping_followup: String,
}

impl Dispatcher {
    /// `ping_followup_len == 0` disables the second ping response.
    pub fn new(rooms: RoomConfig, ping_text_len: usize, ping_followup_len: usize) -> Self {
        Self {
            issuer: SessionIssuer::new(),
            sessions: Mutex::new(SessionRegistry::new()),
            matchmaker: MatchMaker::new(rooms),
            ping_text: "1".repeat(ping_text_len),
            ping_followup: "2".repeat(ping_followup_len),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.rooms.clone(),
            config.ping_text_len,
            config.ping_followup_len,
        )
    }

    pub fn matchmaker(&self) -> &MatchMaker {
        &self.matchmaker
    }

    /// Connections currently logged in.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn session_of(&self, conn: &ServerConnection) -> Option<SessionId> {
        self.sessions.lock().get(conn.id()).map(|s| s.id)
    }

    /// Decodes `frame` and handles it. Undecodable frames are logged and
    /// dropped; the connection stays up.
    pub fn dispatch(&self, conn: &ServerConnection, frame: &Frame) {
        match Message::from_frame(frame) {
            Ok(message) => self.dispatch_message(conn, message),
            Err(ProtocolError::UnknownMessage(id)) => {
                tracing::warn!(conn = %conn.id(), message_id = id, "unknown message id, dropped");
            }
            Err(e) => {
                tracing::warn!(
                    conn = %conn.id(),
                    message_id = frame.message_id(),
                    error = %e,
                    "undecodable payload, dropped"
                );
            }
        }
    }

    pub fn dispatch_message(&self, conn: &ServerConnection, message: Message) {
        match message {
            Message::Login(request) => self.on_login(conn, request),
            Message::Ping(_) => self.on_ping(conn),
            Message::LoginResponse(_) | Message::PingResponse(_) | Message::EnterRoom(_) => {
                tracing::debug!(
                    conn = %conn.id(),
                    message_id = message.id().as_u16(),
                    "client sent a server-only message, ignored"
                );
            }
        }
    }

    fn on_login(&self, conn: &ServerConnection, request: LoginRequest) {
        let conn_id = conn.id();
        let user = UserId::from(conn_id);

        let bound = {
            let mut sessions = self.sessions.lock();
            match sessions.get(conn_id) {
                Some(existing) => Err(existing.id),
                None => {
                    let id = self.issuer.issue();
                    match sessions.bind(conn_id, Session::new(id, request.id, user)) {
                        Ok(session) => Ok(session.id),
                        Err(e) => {
                            tracing::warn!(conn = %conn_id, error = %e, "session bind failed");
                            return;
                        }
                    }
                }
            }
        };

        let session = match bound {
            Ok(session) => session,
            Err(existing) => {
                tracing::info!(conn = %conn_id, session = %existing, "repeat login rejected");
                send(
                    conn,
                    &Message::LoginResponse(LoginResponse {
                        session: existing,
                        error: ERROR_ALREADY_AUTHENTICATED,
                    }),
                );
                return;
            }
        };

        conn.set_session(session);
        send(
            conn,
            &Message::LoginResponse(LoginResponse {
                session,
                error: ERROR_NONE,
            }),
        );

        match self.matchmaker.enter_user(user) {
            Ok(room_number) => send(conn, &Message::EnterRoom(EnterRoom { room_number })),
            Err(e) => tracing::warn!(conn = %conn_id, %user, error = %e, "room assignment failed"),
        }
    }

    fn on_ping(&self, conn: &ServerConnection) {
        tracing::trace!(conn = %conn.id(), "ping");
        send(
            conn,
            &Message::PingResponse(PingResponse {
                error: ERROR_NONE,
                text: self.ping_text.clone(),
            }),
        );
        if !self.ping_followup.is_empty() {
            send(
                conn,
                &Message::PingResponse(PingResponse {
                    error: ERROR_NONE,
                    text: self.ping_followup.clone(),
                }),
            );
        }
    }

    /// Drops the connection's session and takes its user out of their
    /// room. A connection that never logged in has nothing to undo.
    pub fn connection_closed(&self, conn: &ServerConnection) {
        let released = self.sessions.lock().release(conn.id());
        let Ok(session) = released else {
            tracing::debug!(conn = %conn.id(), "closed before login");
            return;
        };
        conn.set_session(SessionId::NONE);

        if let Err(e) = self.matchmaker.exit_user(session.user) {
            tracing::warn!(conn = %conn.id(), session = %session.id, error = %e, "room exit failed");
        }
        tracing::info!(
            conn = %conn.id(),
            session = %session.id,
            login = %session.login,
            online_for_ms = session.bound_at.elapsed().as_millis() as u64,
            "session ended"
        );
    }
}

fn send(conn: &ServerConnection, message: &Message) {
    if let Err(e) = conn.enqueue_message(message) {
        tracing::error!(
            conn = %conn.id(),
            message_id = message.id().as_u16(),
            error = %e,
            "reply encode failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use keelnet_protocol::{ConnectionId, FrameCodec, RoomNumber};

    use super::*;

    fn conn(n: u64) -> Arc<ServerConnection> {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        ServerConnection::new(ConnectionId::new(n), addr, FrameCodec::default())
    }

    fn login(name: &str) -> Message {
        Message::Login(LoginRequest { id: name.into() })
    }

    #[test]
    fn test_dispatch_login_binds_sessions_in_order() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        let (a, b) = (conn(1), conn(2));

        d.dispatch_message(&a, login("alice"));
        d.dispatch_message(&b, login("bob"));

        assert_eq!(d.session_of(&a), Some(SessionId(1)));
        assert_eq!(d.session_of(&b), Some(SessionId(2)));
        assert_eq!(a.session(), SessionId(1));
        // LoginResponse then EnterRoom.
        assert_eq!(a.pending_sends(), 2);
        assert_eq!(d.matchmaker().room_of(UserId(1)), Some(RoomNumber(1)));
    }

    #[test]
    fn test_dispatch_repeat_login_keeps_session() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        let a = conn(1);

        d.dispatch_message(&a, login("alice"));
        d.dispatch_message(&a, login("alice-again"));

        assert_eq!(d.session_of(&a), Some(SessionId(1)));
        assert_eq!(d.session_count(), 1);
        assert_eq!(d.matchmaker().user_count(), 1);
        // Second login only gets the rejection, no new EnterRoom.
        assert_eq!(a.pending_sends(), 3);
    }

    #[test]
    fn test_dispatch_ping_queues_reply_and_followup() {
        let d = Dispatcher::new(RoomConfig::default(), 2000, 200);
        let a = conn(1);
        d.dispatch_message(&a, Message::Ping(Default::default()));
        assert_eq!(a.pending_sends(), 2);
        assert_eq!(d.session_count(), 0);
    }

    #[test]
    fn test_dispatch_ping_without_followup_queues_one_reply() {
        let d = Dispatcher::new(RoomConfig::default(), 2000, 0);
        let a = conn(1);
        d.dispatch_message(&a, Message::Ping(Default::default()));
        assert_eq!(a.pending_sends(), 1);
    }

    #[test]
    fn test_dispatch_server_only_message_is_ignored() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        let a = conn(1);
        d.dispatch_message(
            &a,
            Message::EnterRoom(EnterRoom {
                room_number: RoomNumber(7),
            }),
        );
        assert_eq!(a.pending_sends(), 0);
    }

    #[test]
    fn test_dispatch_bad_payload_is_dropped() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        let a = conn(1);
        d.dispatch(&a, &Frame::new(1, 0, "{not json"));
        d.dispatch(&a, &Frame::new(42, 0, "{}"));
        assert_eq!(a.pending_sends(), 0);
        assert_eq!(d.session_count(), 0);
    }

    #[test]
    fn test_connection_closed_releases_session_and_room() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        let a = conn(1);
        d.dispatch_message(&a, login("alice"));

        d.connection_closed(&a);

        assert_eq!(d.session_count(), 0);
        assert_eq!(a.session(), SessionId::NONE);
        assert_eq!(d.matchmaker().room_of(UserId(1)), None);
        // The room outlives its last member.
        assert_eq!(d.matchmaker().room_count(), 1);
    }

    #[test]
    fn test_connection_closed_before_login_is_noop() {
        let d = Dispatcher::new(RoomConfig::default(), 8, 0);
        d.connection_closed(&conn(1));
        assert_eq!(d.matchmaker().user_count(), 0);
    }
}
