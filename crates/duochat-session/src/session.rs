//! Session types: the server's record of one visitor's identity.

use tokio::time::Instant;

use duochat_protocol::UserId;

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a disconnected visitor can come back with
    /// their resume token and keep their user id.
    ///
    /// Default: one hour, matching the default ban length, so a reload
    /// can't shed an active ban. Set to 0 to disable resumption.
    pub resume_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_grace_secs: 3600,
        }
    }
}

/// Lifecycle state of a session.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                            │
///       └──────────(resume)──────────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Attached to a live connection.
    Connected,

    /// Connection dropped at `since`; resumable until `since + grace`.
    Disconnected { since: Instant },

    /// Grace elapsed. Removed on the next cleanup.
    Expired,
}

/// One visitor's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub state: SessionState,

    /// Secret handed to the client in the `connected` event. 32 hex
    /// characters (128 bits). Unlike the user id it is never shown to
    /// other users, so it is safe to use as proof of identity.
    pub resume_token: String,
}
