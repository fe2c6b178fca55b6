//! Unified error type for the Duochat server.

use duochat_protocol::ProtocolError;
use duochat_room::RoomError;
use duochat_session::SessionError;
use duochat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so the
/// gateway and server deal with this one type.
#[derive(Debug, thiserror::Error)]
pub enum DuochatError {
    /// Connection accept, send or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Matchmaking or relay failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding a listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An environment variable held a value that doesn't parse.
    #[error("invalid value for {key}: {value:?}")]
    Config { key: &'static str, value: String },
}
