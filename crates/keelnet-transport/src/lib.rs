//! TCP connection engines for Keelnet.
//!
//! Two roles share one internal engine:
//!
//! - [`ClientPeer`]: dials a server, reconnects on demand, reports
//!   lifecycle through [`PeerEvent`]s.
//! - [`ServerConnection`]: one per accepted socket, feeding a queue shared
//!   by every connection of a server. [`TcpAcceptor`] produces the sockets.
//!
//! Both keep socket I/O on Tokio tasks. The application only pushes into
//! the send queue and pops from the receive queue; neither blocks beyond a
//! short lock.
//!
//! De-framing lives in [`FrameAssembler`] and is usable on its own.
//! [`RecvBuffers`] pairs it with the socket read chunk so both can be
//! pooled.

mod assembler;
mod client;
mod error;
mod link;
mod queue;
mod resolve;
mod server;
mod state;

pub use assembler::{Assembled, FrameAssembler, Phase};
pub use client::{ClientPeer, PeerEvent};
pub use error::TransportError;
pub use link::{LinkSettings, RecvBuffers};
pub use queue::FrameQueue;
pub use resolve::resolve;
pub use server::{Closed, Inbound, ServerConnection, TcpAcceptor};
pub use state::ConnectionState;
