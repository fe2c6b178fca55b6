//! The session manager: hands out identities and tracks their lifecycle.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain struct over `HashMap`s. The server owns it
//! behind a single `tokio::sync::Mutex`; every operation here is short
//! and never awaits.

use std::collections::HashMap;
use std::time::Duration;

use duochat_protocol::UserId;
use rand::Rng;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Registry of every visitor identity the server currently remembers.
///
/// ```text
/// create() ──→ [Connected] ──disconnect()──→ [Disconnected]
///                  ↑                              │
///                  └──────────resume()────────────┤
///                                                 ▼ expire_stale()
///                                             [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<UserId, Session>,

    /// Resume token → user. Kept in sync with `sessions`.
    tokens: HashMap<String, UserId>,

    /// Next id to mint. Ids are never reused, even after cleanup.
    next_id: u64,

    config: SessionConfig,
}

impl SessionManager {
    /// Creates an empty manager.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            next_id: 1,
            config,
        }
    }

    /// Mints a fresh identity for a new connection.
    pub fn create(&mut self) -> &Session {
        let user_id = UserId(self.next_id);
        self.next_id += 1;

        let token = generate_token();
        self.tokens.insert(token.clone(), user_id);
        tracing::info!(%user_id, "session created");

        self.sessions.entry(user_id).or_insert(Session {
            user_id,
            state: SessionState::Connected,
            resume_token: token,
        })
    }

    /// Marks a user's connection as gone and starts the resume grace
    /// period.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if the user has no session.
    pub fn disconnect(&mut self, user_id: UserId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&user_id)
            .ok_or(SessionError::NotFound(user_id))?;

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%user_id, "user disconnected, resume grace started");
        Ok(())
    }

    /// Re-attaches a returning visitor to their old identity.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token not recognized
    /// - [`SessionError::SessionExpired`]: grace period elapsed
    /// - [`SessionError::AlreadyConnected`]: the session is live on
    ///   another connection
    pub fn resume(&mut self, token: &str) -> Result<&Session, SessionError> {
        let user_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;
        let grace = self.grace();

        let session = self
            .sessions
            .get_mut(&user_id)
            .ok_or(SessionError::InvalidToken)?;

        match session.state {
            SessionState::Disconnected { since } => {
                if since.elapsed() >= grace {
                    session.state = SessionState::Expired;
                    return Err(SessionError::SessionExpired(user_id));
                }
                session.state = SessionState::Connected;
                tracing::info!(%user_id, "session resumed");
                Ok(session)
            }
            SessionState::Connected => {
                Err(SessionError::AlreadyConnected(user_id))
            }
            SessionState::Expired => Err(SessionError::SessionExpired(user_id)),
        }
    }

    /// Expires every disconnected session whose grace period is over.
    ///
    /// Returns the expired user ids.
    pub fn expire_stale(&mut self) -> Vec<UserId> {
        let grace = self.grace();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() >= grace {
                    session.state = SessionState::Expired;
                    expired.push(session.user_id);
                    tracing::debug!(
                        user_id = %session.user_id,
                        "session expired"
                    );
                }
            }
        }

        expired
    }

    /// Drops expired sessions and their tokens.
    pub fn cleanup_expired(&mut self) {
        let tokens = &mut self.tokens;
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                tokens.remove(&session.resume_token);
                false
            } else {
                true
            }
        });
    }

    /// Looks up a session by user id.
    pub fn get(&self, user_id: &UserId) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    /// Returns `true` if the user is attached to a live connection.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        matches!(
            self.sessions.get(user_id).map(|s| &s.state),
            Some(SessionState::Connected)
        )
    }

    /// Number of sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.resume_grace_secs)
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
