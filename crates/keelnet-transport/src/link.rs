//! The per-connection engine both roles share.
//!
//! A [`Link`] owns everything about one live socket that isn't specific
//! to being a client or a server:
//!
//! - lifecycle state and the bound session id
//! - the send lane (pending FIFO, sequence counter, writer channel)
//! - the shutdown signal for the read task
//!
//! A `Link` outlives its sockets. The client reconnects through the same
//! one, and a pooled server connection gets [`Link::reset`] between
//! tenants. The receive side lives in [`RecvBuffers`], which the caller
//! hands to [`run`] and gets back when the socket is done.
//!
//! [`run`] drives the socket: it spawns a single writer task fed by an
//! unbounded channel (so writes never interleave) and runs the read pump
//! on the current task until the peer closes, an error occurs, or
//! [`Link::begin_close`] asks it to stop.

use std::sync::Arc;
use std::time::Instant;

use keelnet_protocol::{ConnectionId, Frame, FrameCodec, SessionId, derive_iv};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};

use crate::assembler::{Assembled, FrameAssembler};
use crate::{ConnectionState, FrameQueue, TransportError};

/// A frame waiting in the send queue. It gets its sequence number only
/// when [`Link::send_out`] picks it up.
#[derive(Debug, Clone)]
pub(crate) struct PendingFrame {
    message_id: u16,
    payload: String,
}

/// Sizes for one connection's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Bytes requested per socket read.
    pub recv_buffer_size: usize,
    /// Largest `total_size` accepted from the peer.
    pub max_frame_size: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            recv_buffer_size: 4096,
            max_frame_size: 4096,
        }
    }
}

/// Receive-side memory of one connection: the socket read chunk and the
/// de-framing accumulator. Both keep their allocation across
/// [`reset`](Self::reset), so a pooled connection reads into the same
/// buffers for every tenant.
#[derive(Debug)]
pub struct RecvBuffers {
    assembler: FrameAssembler,
    chunk: Vec<u8>,
}

impl RecvBuffers {
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            assembler: FrameAssembler::new(settings.max_frame_size),
            chunk: vec![0u8; settings.recv_buffer_size.max(1)],
        }
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    /// Bytes requested per socket read.
    pub fn chunk_len(&self) -> usize {
        self.chunk.len()
    }

    /// Received bytes not yet cut into a frame.
    pub fn buffered(&self) -> usize {
        self.assembler.buffered()
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
    }
}

pub(crate) struct Link {
    codec: FrameCodec,
    state: Mutex<ConnectionState>,
    session: Mutex<SessionId>,
    pending: FrameQueue<PendingFrame>,
    next_sequence: Mutex<u16>,
    writer: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    shutdown: Mutex<Option<Arc<Notify>>>,
    last_send_at: Mutex<Option<Instant>>,
}

impl Link {
    pub(crate) fn new(codec: FrameCodec, state: ConnectionState) -> Self {
        Self {
            codec,
            state: Mutex::new(state),
            session: Mutex::new(SessionId::NONE),
            pending: FrameQueue::new(),
            next_sequence: Mutex::new(0),
            writer: Mutex::new(None),
            shutdown: Mutex::new(None),
            last_send_at: Mutex::new(None),
        }
    }

    pub(crate) fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Sets the state to `to` if `allowed` accepts the current one.
    /// Returns the current state on refusal.
    pub(crate) fn transition(
        &self,
        allowed: impl Fn(ConnectionState) -> bool,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        let mut state = self.state.lock();
        if !allowed(*state) {
            return Err(*state);
        }
        *state = to;
        Ok(())
    }

    pub(crate) fn session(&self) -> SessionId {
        *self.session.lock()
    }

    pub(crate) fn set_session(&self, session: SessionId) {
        *self.session.lock() = session;
    }

    pub(crate) fn last_send_at(&self) -> Option<Instant> {
        *self.last_send_at.lock()
    }

    pub(crate) fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the next sent frame will carry.
    pub(crate) fn next_sequence(&self) -> u16 {
        *self.next_sequence.lock()
    }

    // -- send side --------------------------------------------------------

    pub(crate) fn enqueue(&self, message_id: u16, payload: String) {
        self.pending.push(PendingFrame {
            message_id,
            payload,
        });
    }

    /// Encodes at most one pending frame and hands it to the writer task.
    ///
    /// Returns `true` if more frames are still queued. Returns `false`
    /// without dequeuing anything while the link has no writer (not yet
    /// connected, or already closing).
    pub(crate) fn send_out(&self, conn: ConnectionId) -> bool {
        let Some(writer) = self.writer.lock().clone() else {
            return false;
        };
        let Some(frame) = self.pending.pop() else {
            return false;
        };

        let sequence = {
            let mut next = self.next_sequence.lock();
            let seq = *next;
            *next = seq.wrapping_add(1);
            seq
        };
        *self.last_send_at.lock() = Some(Instant::now());

        let session = self.session();
        let iv = derive_iv(session, sequence);
        tracing::trace!(
            %conn,
            message_id = frame.message_id,
            sequence,
            %session,
            iv = ?iv,
            "sending frame"
        );

        match self
            .codec
            .encode(frame.message_id, sequence, &frame.payload)
        {
            Ok(bytes) => {
                if writer.send(bytes).is_err() {
                    tracing::debug!(%conn, "writer gone, frame discarded");
                    return false;
                }
            }
            Err(e) => {
                tracing::error!(%conn, message_id = frame.message_id, error = %e, "frame encode failed");
            }
        }

        !self.pending.is_empty()
    }

    // -- lifecycle --------------------------------------------------------

    /// Installs a fresh shutdown signal for the attempt that is about to
    /// start. Called on entering `Connecting`, so a close requested before
    /// the socket opens can still be delivered.
    pub(crate) fn arm(&self) -> Arc<Notify> {
        let signal = Arc::new(Notify::new());
        *self.shutdown.lock() = Some(Arc::clone(&signal));
        signal
    }

    /// The signal installed by [`arm`](Self::arm), or a fresh unarmed one
    /// if the attempt was already cancelled.
    pub(crate) fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown
            .lock()
            .clone()
            .unwrap_or_else(|| Arc::new(Notify::new()))
    }

    /// Installs the writer for a newly opened socket. Stale sends from an
    /// earlier attempt are discarded and the sequence restarts at 0.
    ///
    /// Returns `false` without touching anything if the link is no longer
    /// `Connecting`, which means a close won the race against the open.
    fn open(&self, writer: mpsc::UnboundedSender<Vec<u8>>) -> bool {
        let mut state = self.state.lock();
        if *state != ConnectionState::Connecting {
            return false;
        }
        let stale = self.pending.clear();
        if stale > 0 {
            tracing::debug!(stale, "discarded stale sends");
        }
        *self.next_sequence.lock() = 0;
        *self.writer.lock() = Some(writer);
        *state = ConnectionState::Connected;
        true
    }

    /// Starts closing the link, or cancels an attempt still `Connecting`.
    ///
    /// Drops the writer (which flushes what it has, then half-closes the
    /// socket) and wakes the read task. Returns `false` if there was
    /// nothing to close, so concurrent calls act once.
    pub(crate) fn begin_close(&self) -> bool {
        if self
            .transition(
                |s| matches!(s, ConnectionState::Connected | ConnectionState::Connecting),
                ConnectionState::Disconnecting,
            )
            .is_err()
        {
            return false;
        }
        self.writer.lock().take();
        if let Some(shutdown) = self.shutdown.lock().take() {
            shutdown.notify_one();
        }
        true
    }

    /// Returns a closed link to its initial condition: no session, empty
    /// send queue, sequence 0, no send timestamp.
    ///
    /// # Errors
    /// The current state, unless it is `Disconnected`.
    pub(crate) fn reset(&self) -> Result<(), ConnectionState> {
        let state = self.state.lock();
        if *state != ConnectionState::Disconnected {
            return Err(*state);
        }
        self.pending.clear();
        *self.next_sequence.lock() = 0;
        *self.last_send_at.lock() = None;
        *self.session.lock() = SessionId::NONE;
        self.writer.lock().take();
        self.shutdown.lock().take();
        Ok(())
    }

    /// Final transition, run once when the attempt is over.
    pub(crate) fn finish_close(&self) {
        self.writer.lock().take();
        self.shutdown.lock().take();
        self.set_session(SessionId::NONE);
        self.set_state(ConnectionState::Disconnected);
    }
}

// ---------------------------------------------------------------------------
// I/O tasks
// ---------------------------------------------------------------------------

/// Reads until the peer closes (`Ok`) or something fatal happens (`Err`).
///
/// Every complete frame goes to `deliver`; frames that fail to decode are
/// logged and skipped.
pub(crate) async fn read_pump<R>(
    reader: &mut R,
    buffers: &mut RecvBuffers,
    codec: &FrameCodec,
    conn: ConnectionId,
    mut deliver: impl FnMut(Frame),
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let RecvBuffers { assembler, chunk } = buffers;
    loop {
        let n = reader
            .read(&mut chunk[..])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(());
        }
        assembler.extend(&chunk[..n]);

        while let Some(assembled) = assembler.next_frame(codec)? {
            match assembled {
                Assembled::Frame(frame) => deliver(frame),
                Assembled::Dropped(e) => {
                    tracing::warn!(%conn, error = %e, "dropped frame");
                }
            }
        }
        assembler.compact();
    }
}

/// Writes frames in channel order until every sender is gone, then
/// half-closes the write side.
pub(crate) async fn write_loop<W>(
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = frames.recv().await {
        writer
            .write_all(&bytes)
            .await
            .map_err(TransportError::SendFailed)?;
    }
    writer.shutdown().await.map_err(TransportError::SendFailed)
}

/// How a [`run`] ended.
pub(crate) struct RunOutcome {
    /// `false` if the link was closed before the socket could be opened.
    pub(crate) opened: bool,
    /// `None` for a clean close by either side.
    pub(crate) error: Option<TransportError>,
    /// Reset and ready for the next socket.
    pub(crate) buffers: RecvBuffers,
}

/// Drives one socket to completion.
///
/// `shutdown` is the signal from [`Link::arm`]. `on_open` runs right after
/// the link turns `Connected`; if a close was requested while connecting,
/// the socket is dropped unopened and `on_open` never runs. On return the
/// link is `Disconnected`.
pub(crate) async fn run(
    link: Arc<Link>,
    stream: TcpStream,
    conn: ConnectionId,
    mut buffers: RecvBuffers,
    shutdown: Arc<Notify>,
    on_open: impl FnOnce(),
    deliver: impl FnMut(Frame),
) -> RunOutcome {
    let (tx, rx) = mpsc::unbounded_channel();
    if !link.open(tx) {
        tracing::debug!(%conn, "closed before the socket opened");
        link.finish_close();
        return RunOutcome {
            opened: false,
            error: None,
            buffers,
        };
    }

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%conn, error = %e, "set_nodelay failed");
    }
    let (mut read_half, write_half) = stream.into_split();
    on_open();

    let writer_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if let Err(e) = write_loop(write_half, rx).await {
            tracing::debug!(%conn, error = %e, "writer stopped");
            writer_shutdown.notify_one();
        }
    });

    let codec = link.codec().clone();
    let error = tokio::select! {
        r = read_pump(&mut read_half, &mut buffers, &codec, conn, deliver) => r.err(),
        _ = shutdown.notified() => None,
    };

    link.finish_close();
    buffers.reset();
    RunOutcome {
        opened: true,
        error,
        buffers,
    }
}
