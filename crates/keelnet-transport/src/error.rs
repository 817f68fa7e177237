use crate::ConnectionState;

/// Errors that can occur in the transport layer.
///
/// Everything here is terminal for the connection it happened on. The
/// engines never let these cross the I/O boundary as a panic; they become
/// a state transition to [`ConnectionState::Disconnected`] plus a
/// notification.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the TCP connection failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The host name did not resolve to any usable address.
    #[error("could not resolve {host}: {source}")]
    ResolveFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The operation is not allowed in the connection's current state.
    #[error("operation not allowed while {0:?}")]
    InvalidState(ConnectionState),

    /// `disconnect` was called before a connect attempt finished.
    #[error("connect cancelled")]
    Cancelled,

    /// No Tokio runtime is available to drive the connection.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A header announced a frame larger than the configured maximum.
    /// The stream can't be trusted past this point.
    #[error("frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// A header announced a frame smaller than the header itself.
    #[error("frame of {size} bytes is smaller than its header")]
    FrameTooSmall { size: usize },
}
