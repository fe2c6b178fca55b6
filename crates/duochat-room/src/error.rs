//! Error types for the matchmaking and room layer.
//!
//! None of these reach the user directly: the gateway logs them and
//! drops the event that caused them.

use duochat_protocol::{RoomId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The user is already waiting for a partner.
    #[error("user {0} is already queued")]
    AlreadyQueued(UserId),

    /// A message came from a user who has no room.
    #[error("user {0} is not in a room")]
    NotInRoom(UserId),

    /// A dequeued candidate had already disconnected. Handled inside the
    /// matchmaker by trying the next entry.
    #[error("partner {0} is no longer connected")]
    PartnerUnavailable(UserId),

    /// Pairing would put a user in a second room.
    #[error("user {0} is already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    /// A user can't be paired with themselves.
    #[error("user {0} cannot be paired with themselves")]
    SelfPairing(UserId),

    /// The room actor has stopped (the room was just dissolved).
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
