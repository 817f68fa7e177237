//! Unified error type for the Keelnet meta-crate.

use keelnet_protocol::{FrameError, ProtocolError};
use keelnet_room::RoomError;
use keelnet_session::SessionError;
use keelnet_transport::TransportError;

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::pool::PoolError;

/// Wraps every layer's error so `?` works across crate boundaries.
#[derive(Debug, thiserror::Error)]
pub enum KeelnetError {
    /// Socket-level failure: connect, accept, read, write, bad frame size.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Payload JSON or unknown message id.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A single frame failed its integrity check or did not decrypt.
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

#[cfg(test)]
mod tests {
    use keelnet_protocol::{ConnectionId, UserId};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: KeelnetError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, KeelnetError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_frame_error() {
        let err: KeelnetError = FrameError::DecryptFailure.into();
        assert!(matches!(err, KeelnetError::Frame(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: KeelnetError = ProtocolError::UnknownMessage(77).into();
        assert!(matches!(err, KeelnetError::Protocol(_)));
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn test_from_session_error() {
        let err: KeelnetError = SessionError::NotFound(ConnectionId::new(3)).into();
        assert!(matches!(err, KeelnetError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err: KeelnetError = RoomError::NotInAnyRoom(UserId(9)).into();
        assert!(matches!(err, KeelnetError::Room(_)));
    }
}
