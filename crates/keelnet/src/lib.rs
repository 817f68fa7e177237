//! # Keelnet
//!
//! Encrypted, checksummed TCP framing with a small login/room layer on
//! top.
//!
//! Every frame is a 16-byte little-endian header followed by an
//! AES-128-ECB body holding one JSON message. The server issues a session
//! on login, answers pings, and places each logged-in user in a room of
//! at most 100 members.
//!
//! This crate ties the layers together:
//!
//! - `keelnet-protocol`: wire header, CRC, cipher, message catalog
//! - `keelnet-transport`: de-framing, send/receive queues, client and
//!   server connection engines
//! - `keelnet-session`: session issuance and binding
//! - `keelnet-room`: matchmaking
//! - `keelnet-tick`: the clock the server pump runs on
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keelnet::prelude::*;
//!
//! # async fn serve() -> Result<(), KeelnetError> {
//! let server = KeelnetServer::builder()
//!     .config(ServerConfig::default())
//!     .build()?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod dispatcher;
mod error;
pub mod logging;
pub mod pool;
mod server;

pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::KeelnetError;
pub use logging::{LogConfig, LogFormat, LoggingError, init_tracing};
pub use pool::{ConnectionPool, Lease, PoolError, SlotKey};
pub use server::{KeelnetServer, KeelnetServerBuilder, ServerHandle};

pub use keelnet_protocol as protocol;
pub use keelnet_room as room;
pub use keelnet_session as session;
pub use keelnet_tick as tick;
pub use keelnet_transport as transport;

/// Everything needed to run a server or drive a client.
pub mod prelude {
    pub use crate::{
        ClientConfig, KeelnetError, KeelnetServer, LogConfig, ServerConfig, ServerHandle,
        init_tracing,
    };

    pub use keelnet_protocol::{
        CipherKey, ConnectionId, EnterRoom, Frame, LoginRequest, LoginResponse, Message,
        MessageId, PingRequest, PingResponse, RoomNumber, SessionId, UserId,
    };
    pub use keelnet_room::{MatchMaker, RoomConfig, RoomError};
    pub use keelnet_transport::{ClientPeer, ConnectionState, PeerEvent, TransportError};
}
