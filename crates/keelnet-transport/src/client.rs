//! Client-role connection engine.
//!
//! A [`ClientPeer`] owns at most one socket at a time and can reconnect
//! after a disconnect. Network I/O runs on Tokio tasks; the application
//! touches only the two queues, from whatever thread drives its update
//! loop:
//!
//! ```text
//!  app tick ──enqueue──► [send queue] ──send_out──► writer task ──► socket
//!  app tick ◄─dispatch── [recv queue] ◄── read task ◄──────────────── socket
//! ```
//!
//! Lifecycle changes are reported as [`PeerEvent`]s on the channel
//! returned by [`ClientPeer::new`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use keelnet_protocol::{
    CipherKey, ConnectionId, Frame, FrameCodec, Message, ProtocolError, SessionId,
};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::link::{self, Link, LinkSettings, RecvBuffers};
use crate::{ConnectionState, FrameQueue, TransportError, resolve};

/// Lifecycle notifications from a [`ClientPeer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The socket is open and the receive loop is running.
    Connected,
    /// Resolving or connecting failed, or `disconnect` cancelled the
    /// attempt; the peer is `Disconnected`.
    ConnectFailed(String),
    /// An established connection ended. Sent once per connection.
    Disconnected,
}

struct PeerInner {
    settings: LinkSettings,
    link: Arc<Link>,
    /// Kept between connections; `None` while a socket is using them.
    buffers: Mutex<Option<RecvBuffers>>,
    inbound: FrameQueue<Frame>,
    events: mpsc::UnboundedSender<PeerEvent>,
    next_conn: AtomicU64,
    current_conn: AtomicU64,
}

/// Client-side connection engine. Cheap to clone; clones share one
/// connection.
#[derive(Clone)]
pub struct ClientPeer {
    inner: Arc<PeerInner>,
}

impl ClientPeer {
    pub fn new(
        settings: LinkSettings,
        key: CipherKey,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = PeerInner {
            settings,
            link: Arc::new(Link::new(
                FrameCodec::new(key),
                ConnectionState::Uninitialized,
            )),
            buffers: Mutex::new(Some(RecvBuffers::new(settings))),
            inbound: FrameQueue::new(),
            events,
            next_conn: AtomicU64::new(1),
            current_conn: AtomicU64::new(0),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Session id bound by the last successful login, `0` before that.
    pub fn session(&self) -> SessionId {
        self.inner.link.session()
    }

    /// Binds the session from a login response. Feeds the per-frame IV.
    pub fn set_session(&self, session: SessionId) {
        self.inner.link.set_session(session);
    }

    /// When the last frame was handed to the writer.
    pub fn last_send_at(&self) -> Option<Instant> {
        self.inner.link.last_send_at()
    }

    /// Starts connecting to `host:port` and returns immediately.
    ///
    /// The outcome arrives as [`PeerEvent::Connected`] or
    /// [`PeerEvent::ConnectFailed`]. Frames enqueued before the connection
    /// opens are discarded when it does, and frames received on an earlier
    /// connection but never dispatched are discarded right away.
    ///
    /// # Errors
    /// [`TransportError::InvalidState`] unless the peer is `Uninitialized`
    /// or `Disconnected` (in particular while `Disconnecting`), and
    /// [`TransportError::NoRuntime`] outside a Tokio runtime.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        self.inner
            .link
            .transition(ConnectionState::can_connect, ConnectionState::Connecting)
            .map_err(TransportError::InvalidState)?;

        let cancel = self.inner.link.arm();
        let stale = self.inner.inbound.clear();
        if stale > 0 {
            tracing::debug!(stale, "discarded undispatched frames from the last connection");
        }

        let raw = self.inner.next_conn.fetch_add(1, Ordering::Relaxed);
        self.inner.current_conn.store(raw, Ordering::Relaxed);
        let conn = ConnectionId::new(raw);
        let inner = Arc::clone(&self.inner);
        let host = host.to_string();
        tracing::debug!(%conn, %host, port, "connecting");

        runtime.spawn(async move {
            let opened = tokio::select! {
                r = open(&host, port) => r,
                _ = cancel.notified() => Err(TransportError::Cancelled),
            };
            let stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(%conn, %host, port, error = %e, "connect failed");
                    inner.link.finish_close();
                    let _ = inner.events.send(PeerEvent::ConnectFailed(e.to_string()));
                    return;
                }
            };

            let buffers = inner
                .buffers
                .lock()
                .take()
                .unwrap_or_else(|| RecvBuffers::new(inner.settings));
            let outcome = link::run(
                Arc::clone(&inner.link),
                stream,
                conn,
                buffers,
                cancel,
                || {
                    tracing::info!(%conn, %host, port, "connected");
                    let _ = inner.events.send(PeerEvent::Connected);
                },
                |frame| inner.inbound.push(frame),
            )
            .await;
            *inner.buffers.lock() = Some(outcome.buffers);

            if !outcome.opened {
                tracing::info!(%conn, "connect cancelled");
                let _ = inner
                    .events
                    .send(PeerEvent::ConnectFailed(TransportError::Cancelled.to_string()));
                return;
            }
            match outcome.error {
                Some(e) => tracing::warn!(%conn, error = %e, "connection lost"),
                None => tracing::info!(%conn, "disconnected"),
            }
            let _ = inner.events.send(PeerEvent::Disconnected);
        });
        Ok(())
    }

    /// Begins a graceful close. Returns `false` if neither connected nor
    /// connecting.
    ///
    /// [`PeerEvent::Disconnected`] follows once the read loop has stopped.
    /// A connect still in flight is cancelled instead and reports
    /// [`PeerEvent::ConnectFailed`].
    pub fn disconnect(&self) -> bool {
        self.inner.link.begin_close()
    }

    /// Queues a frame for sending. Never blocks.
    pub fn enqueue(&self, message_id: u16, json: impl Into<String>) {
        self.inner.link.enqueue(message_id, json.into());
    }

    /// Queues a catalog message.
    pub fn enqueue_message(&self, message: &Message) -> Result<(), ProtocolError> {
        let (id, json) = message.to_parts()?;
        self.enqueue(id, json);
        Ok(())
    }

    /// Sends at most one queued frame. Returns `true` if more remain.
    pub fn send_out(&self) -> bool {
        let conn = ConnectionId::new(self.inner.current_conn.load(Ordering::Relaxed));
        self.inner.link.send_out(conn)
    }

    pub fn pending_sends(&self) -> usize {
        self.inner.link.pending_sends()
    }

    /// Received frames waiting for [`dispatch`](Self::dispatch).
    pub fn pending_receives(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Takes the oldest received frame, if any.
    pub fn dispatch(&self) -> Option<Frame> {
        self.inner.inbound.pop()
    }

    /// Hands the oldest received frame to `handler`. The queue lock is
    /// released before the handler runs. Returns `false` if the queue was
    /// empty.
    pub fn dispatch_with(&self, handler: impl FnOnce(Frame)) -> bool {
        match self.dispatch() {
            Some(frame) => {
                handler(frame);
                true
            }
            None => false,
        }
    }

    /// One application tick: every received frame goes to `handler`, then
    /// the send queue is drained.
    pub fn pump(&self, mut handler: impl FnMut(Frame)) {
        while let Some(frame) = self.dispatch() {
            handler(frame);
        }
        while self.send_out() {}
    }
}

async fn open(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let addr = resolve(host, port).await?;
    TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::ConnectFailed { addr, source })
}

impl std::fmt::Debug for ClientPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPeer")
            .field("state", &self.state())
            .field("session", &self.session())
            .finish()
    }
}
