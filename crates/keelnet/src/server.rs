//! `KeelnetServer` builder, accept loop and dispatch pump.
//!
//! Two tasks run for the lifetime of the server:
//!
//! ```text
//!  accept loop ── pooled ServerConnection ──► per-connection I/O tasks
//!                                                   │ frames / Closed
//!  pump (every tick) ◄──────────────────────────────┘
//!     1. drain the shared inbound queue into the Dispatcher
//!     2. process Closed notices (session, room, pool slot)
//!     3. flush every connection's send queue
//! ```
//!
//! [`ServerHandle::shutdown`] stops the accept loop and closes every live
//! connection. The pump keeps ticking until the last one is retired, then
//! `run` returns. Dropping the `run` future instead still closes every
//! socket, but skips the bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use keelnet_protocol::{CipherKey, ConnectionId, FrameCodec};
use keelnet_room::MatchMaker;
use keelnet_tick::TickScheduler;
use keelnet_transport::{Closed, FrameQueue, Inbound, ServerConnection, TcpAcceptor};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};

use crate::dispatcher::Dispatcher;
use crate::pool::{ConnectionPool, SlotKey};
use crate::{KeelnetError, ServerConfig};

struct LiveConnection {
    conn: Arc<ServerConnection>,
    slot: SlotKey,
}

/// State shared by the accept loop, the pump and any [`ServerHandle`].
struct ServerState {
    config: ServerConfig,
    codec: FrameCodec,
    dispatcher: Dispatcher,
    live: Mutex<HashMap<ConnectionId, LiveConnection>>,
    pool: Mutex<ConnectionPool>,
    inbound: Arc<FrameQueue<Inbound>>,
    stop: Notify,
    /// Set once the accept loop has stopped and every connection was told
    /// to close. The pump exits when this is set and `live` is empty.
    draining: AtomicBool,
}

impl ServerState {
    /// Asks every live connection to close. Returns how many were open.
    fn disconnect_all(&self) -> usize {
        let connections: Vec<_> = self
            .live
            .lock()
            .values()
            .map(|l| Arc::clone(&l.conn))
            .collect();
        connections.iter().filter(|c| c.disconnect()).count()
    }
}

/// Builder for a [`KeelnetServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = KeelnetServer::builder()
///     .config(ServerConfig { port: 20000, ..Default::default() })
///     .build()?;
/// server.run().await
/// ```
pub struct KeelnetServerBuilder {
    config: ServerConfig,
    key: CipherKey,
}

impl KeelnetServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            key: CipherKey::embedded(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the configured host and port.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.host = addr.ip();
        self.config.port = addr.port();
        self
    }

    /// Replaces the embedded key. Both peers must agree on it.
    pub fn key(mut self, key: CipherKey) -> Self {
        self.key = key;
        self
    }

    /// Validates the config and binds the listening socket.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<KeelnetServer, KeelnetError> {
        self.config.validate()?;
        let acceptor = TcpAcceptor::bind(self.config.bind_addr(), self.config.backlog)?;

        let codec = FrameCodec::new(self.key);
        let pool = ConnectionPool::new(
            self.config.max_connections,
            &codec,
            self.config.link_settings(),
        );
        let state = Arc::new(ServerState {
            codec,
            dispatcher: Dispatcher::from_config(&self.config),
            live: Mutex::new(HashMap::new()),
            pool: Mutex::new(pool),
            inbound: Arc::new(FrameQueue::new()),
            stop: Notify::new(),
            draining: AtomicBool::new(false),
            config: self.config,
        });

        Ok(KeelnetServer { acceptor, state })
    }
}

impl Default for KeelnetServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Keelnet server. Call [`run`](Self::run) to start serving.
pub struct KeelnetServer {
    acceptor: TcpAcceptor,
    state: Arc<ServerState>,
}

impl KeelnetServer {
    pub fn builder() -> KeelnetServerBuilder {
        KeelnetServerBuilder::new()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, KeelnetError> {
        Ok(self.acceptor.local_addr()?)
    }

    /// A read-only view that stays valid after `run` takes the server.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Starts the pump and accepts connections until
    /// [`ServerHandle::shutdown`] is called, then closes every connection
    /// and returns once all of them have been retired.
    pub async fn run(self) -> Result<(), KeelnetError> {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let mut guard = StopOnDrop {
            state: Arc::clone(&self.state),
            pump: tokio::spawn(pump(Arc::clone(&self.state), closed_rx)),
        };

        tracing::info!(
            addr = %self.acceptor.local_addr()?,
            max_connections = self.state.config.max_connections,
            tick_rate_hz = self.state.config.tick_rate_hz,
            "keelnet server running"
        );

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.state.stop.notified() => break,
                accepted = self.acceptor.accept() => accepted,
            };
            match accepted {
                Ok((id, stream, peer_addr)) => self.admit(id, stream, peer_addr, &closed_tx),
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        let closing = self.state.disconnect_all();
        self.state.draining.store(true, Ordering::Release);
        tracing::info!(closing, "keelnet server shutting down");

        if let Err(e) = (&mut guard.pump).await {
            tracing::error!(error = %e, "pump task failed");
        }
        tracing::info!("keelnet server stopped");
        Ok(())
    }

    /// Pairs an accepted socket with a pooled connection and starts it.
    fn admit(
        &self,
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        closed_tx: &mpsc::UnboundedSender<Closed>,
    ) {
        let Some(lease) = self.state.pool.lock().acquire() else {
            tracing::warn!(
                conn = %id,
                %peer_addr,
                max_connections = self.state.config.max_connections,
                "connection pool exhausted, closing socket"
            );
            drop(stream);
            return;
        };

        if let Err(e) = lease.conn.assign(id, peer_addr) {
            tracing::error!(conn = %id, slot = lease.key.index(), error = %e, "pooled connection not idle, closing socket");
            return;
        }
        self.state.live.lock().insert(
            id,
            LiveConnection {
                conn: Arc::clone(&lease.conn),
                slot: lease.key,
            },
        );
        lease.conn.start(
            stream,
            lease.buffers,
            Arc::clone(&self.state.inbound),
            closed_tx.clone(),
        );
        tracing::info!(conn = %id, %peer_addr, slot = lease.key.index(), "client connected");
    }
}

/// Stops the pump and closes every live socket when `run` ends or its
/// future is dropped.
struct StopOnDrop {
    state: Arc<ServerState>,
    pump: tokio::task::JoinHandle<()>,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.pump.abort();
        let closed = self.state.disconnect_all();
        if closed > 0 {
            tracing::warn!(closed, "server dropped with live connections");
        }
    }
}

async fn pump(state: Arc<ServerState>, mut closed: mpsc::UnboundedReceiver<Closed>) {
    let mut scheduler = TickScheduler::new(state.config.tick_config());
    loop {
        scheduler.wait_for_tick().await;

        while let Some(Inbound { conn, frame }) = state.inbound.pop() {
            let target = state.live.lock().get(&conn).map(|l| Arc::clone(&l.conn));
            match target {
                Some(target) => state.dispatcher.dispatch(&target, &frame),
                None => tracing::trace!(%conn, "frame for a finished connection, dropped"),
            }
        }

        while let Ok(notice) = closed.try_recv() {
            retire(&state, notice);
        }

        let connections: Vec<_> = state
            .live
            .lock()
            .values()
            .map(|l| Arc::clone(&l.conn))
            .collect();
        for conn in connections {
            while conn.send_out() {}
        }

        scheduler.end_tick();

        if state.draining.load(Ordering::Acquire) && state.live.lock().is_empty() {
            break;
        }
    }
}

/// Tears down a closed connection and returns its slot to the pool.
fn retire(state: &ServerState, notice: Closed) {
    let Some(live) = state.live.lock().remove(&notice.conn) else {
        tracing::warn!(conn = %notice.conn, "close notice for unknown connection");
        return;
    };
    state.dispatcher.connection_closed(&live.conn);

    let released = state.pool.lock().release(live.slot, notice.buffers);
    if let Err(e) = released {
        tracing::warn!(conn = %notice.conn, error = %e, "pool release refused");
    }

    match notice.error {
        Some(e) => tracing::info!(conn = %notice.conn, error = %e, "client disconnected"),
        None => tracing::info!(conn = %notice.conn, "client disconnected"),
    }
}

/// Cheap, cloneable view of a server's state for monitoring and tests.
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<ServerState>,
}

impl ServerHandle {
    pub fn matchmaker(&self) -> &MatchMaker {
        self.state.dispatcher.matchmaker()
    }

    pub fn session_count(&self) -> usize {
        self.state.dispatcher.session_count()
    }

    /// Connections accepted and not yet retired by the pump.
    pub fn connection_count(&self) -> usize {
        self.state.live.lock().len()
    }

    pub fn pool_in_use(&self) -> usize {
        self.state.pool.lock().in_use()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Stops accepting and closes every connection. The server's `run`
    /// returns once the pump has retired them all. Safe to call more than
    /// once, or before `run` starts.
    pub fn shutdown(&self) {
        tracing::debug!("shutdown requested");
        self.state.stop.notify_one();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("connections", &self.connection_count())
            .field("sessions", &self.session_count())
            .finish()
    }
}
