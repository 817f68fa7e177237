//! Server-role connection engine and TCP acceptor.
//!
//! Every accepted socket is served by one [`ServerConnection`]. Its read
//! task pushes decoded frames into a queue shared by *all* connections,
//! tagged with the connection id, so a single dispatcher can drain them on
//! its tick. When the socket closes, a [`Closed`] notice carries the
//! [`RecvBuffers`] back to whoever owns the pool.
//!
//! A `ServerConnection` can serve many sockets in turn. A pool creates it
//! [`idle`](ServerConnection::idle), [`assign`](ServerConnection::assign)s
//! it to each accepted socket and [`reset`](ServerConnection::reset)s it
//! after the close.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use keelnet_protocol::{ConnectionId, Frame, FrameCodec, Message, ProtocolError, SessionId};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;

use crate::link::{self, Link, RecvBuffers};
use crate::{ConnectionState, FrameQueue, TransportError};

/// A frame received from one of the server's connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub conn: ConnectionId,
    pub frame: Frame,
}

/// Sent once when a connection's read task has finished.
#[derive(Debug)]
pub struct Closed {
    pub conn: ConnectionId,
    /// Reset and ready for the next connection.
    pub buffers: RecvBuffers,
    /// `None` for a clean close by either side.
    pub error: Option<TransportError>,
}

// ---------------------------------------------------------------------------
// TcpAcceptor
// ---------------------------------------------------------------------------

/// Listening socket that hands out accepted streams with fresh ids.
pub struct TcpAcceptor {
    listener: TcpListener,
    next_id: AtomicU64,
}

impl TcpAcceptor {
    /// Binds `addr` with an explicit listen backlog.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, TransportError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(TransportError::AcceptFailed)?;
        socket
            .set_reuseaddr(true)
            .map_err(TransportError::AcceptFailed)?;
        socket.bind(addr).map_err(TransportError::AcceptFailed)?;
        let listener = socket
            .listen(backlog)
            .map_err(TransportError::AcceptFailed)?;

        tracing::info!(%addr, backlog, "TCP acceptor listening");
        Ok(Self {
            listener,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }

    /// Waits for the next connection.
    pub async fn accept(&self) -> Result<(ConnectionId, TcpStream, SocketAddr), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted TCP connection");
        Ok((id, stream, addr))
    }
}

// ---------------------------------------------------------------------------
// ServerConnection
// ---------------------------------------------------------------------------

/// One accepted socket, shared between its I/O tasks and the dispatcher.
pub struct ServerConnection {
    id: AtomicU64,
    peer_addr: Mutex<SocketAddr>,
    link: Arc<Link>,
}

impl ServerConnection {
    /// Creates a connection already assigned to `id`. Nothing runs until
    /// [`start`](Self::start), so the caller can register it first.
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, codec: FrameCodec) -> Arc<Self> {
        let conn = Self {
            id: AtomicU64::new(id.into_inner()),
            peer_addr: Mutex::new(peer_addr),
            link: Arc::new(Link::new(codec, ConnectionState::Connecting)),
        };
        conn.link.arm();
        Arc::new(conn)
    }

    /// Creates an unassigned, `Disconnected` connection for a pool.
    pub fn idle(codec: FrameCodec) -> Arc<Self> {
        Arc::new(Self {
            id: AtomicU64::new(0),
            peer_addr: Mutex::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
            link: Arc::new(Link::new(codec, ConnectionState::Disconnected)),
        })
    }

    /// Hands an idle connection to a freshly accepted socket and moves it
    /// to `Connecting`.
    ///
    /// # Errors
    /// [`TransportError::InvalidState`] unless the connection is
    /// `Disconnected`.
    pub fn assign(&self, id: ConnectionId, peer_addr: SocketAddr) -> Result<(), TransportError> {
        self.link
            .transition(
                |s| s == ConnectionState::Disconnected,
                ConnectionState::Connecting,
            )
            .map_err(TransportError::InvalidState)?;
        self.id.store(id.into_inner(), Ordering::Relaxed);
        *self.peer_addr.lock() = peer_addr;
        self.link.arm();
        Ok(())
    }

    /// Takes over `stream` and starts its I/O tasks.
    ///
    /// `buffers` usually come from a pool; they are reset on close and
    /// returned through `closed`. A connection closed while still
    /// `Connecting` drops the stream unread and still sends its notice.
    pub fn start(
        &self,
        stream: TcpStream,
        buffers: RecvBuffers,
        inbound: Arc<FrameQueue<Inbound>>,
        closed: mpsc::UnboundedSender<Closed>,
    ) {
        let id = self.id();
        let link = Arc::clone(&self.link);
        let shutdown = link.shutdown_signal();
        tokio::spawn(async move {
            let outcome = link::run(
                link,
                stream,
                id,
                buffers,
                shutdown,
                || {},
                |frame| inbound.push(Inbound { conn: id, frame }),
            )
            .await;

            match &outcome.error {
                Some(e) => tracing::warn!(%id, error = %e, "connection closed with error"),
                None => tracing::debug!(%id, opened = outcome.opened, "connection closed"),
            }
            let _ = closed.send(Closed {
                conn: id,
                buffers: outcome.buffers,
                error: outcome.error,
            });
        });
    }

    /// Returns a closed connection to its idle condition: no session,
    /// empty send queue, sequence 0.
    ///
    /// # Errors
    /// The current state, unless it is `Disconnected`.
    pub fn reset(&self) -> Result<(), ConnectionState> {
        self.link.reset()
    }

    pub fn id(&self) -> ConnectionId {
        ConnectionId::new(self.id.load(Ordering::Relaxed))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        *self.peer_addr.lock()
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn session(&self) -> SessionId {
        self.link.session()
    }

    pub fn set_session(&self, session: SessionId) {
        self.link.set_session(session);
    }

    pub fn last_send_at(&self) -> Option<Instant> {
        self.link.last_send_at()
    }

    pub fn enqueue(&self, message_id: u16, json: impl Into<String>) {
        self.link.enqueue(message_id, json.into());
    }

    pub fn enqueue_message(&self, message: &Message) -> Result<(), ProtocolError> {
        let (id, json) = message.to_parts()?;
        self.enqueue(id, json);
        Ok(())
    }

    /// Sends at most one queued frame. Returns `true` if more remain.
    pub fn send_out(&self) -> bool {
        self.link.send_out(self.id())
    }

    pub fn pending_sends(&self) -> usize {
        self.link.pending_sends()
    }

    /// Sequence number the next sent frame will carry.
    pub fn next_sequence(&self) -> u16 {
        self.link.next_sequence()
    }

    /// Flushes queued writes, half-closes and stops reading. A connection
    /// still `Connecting` is closed before it opens. Returns `false` if
    /// there was nothing to close.
    pub fn disconnect(&self) -> bool {
        self.link.begin_close()
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.id())
            .field("peer_addr", &self.peer_addr())
            .field("state", &self.state())
            .finish()
    }
}
