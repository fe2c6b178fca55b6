//! Error types for the session layer.

use duochat_protocol::UserId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given user. An event for an id with
    /// no live session is dropped.
    #[error("unknown user {0}")]
    NotFound(UserId),

    /// The resume token doesn't match any session.
    #[error("invalid resume token")]
    InvalidToken,

    /// The resume grace period has elapsed.
    #[error("session expired for user {0}")]
    SessionExpired(UserId),

    /// The session is already attached to a live connection.
    #[error("user {0} already has an active connection")]
    AlreadyConnected(UserId),
}
