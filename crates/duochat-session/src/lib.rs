//! Visitor identity for Duochat.
//!
//! Visitors are anonymous, so "identity" is whatever the server hands
//! out on first connect:
//!
//! 1. **Assignment**: a fresh [`UserId`](duochat_protocol::UserId) and a
//!    secret resume token per new session ([`SessionManager::create`]).
//! 2. **Resumption**: a browser that comes back within the grace period
//!    presents its token and keeps the same id, so bans keyed by that id
//!    still apply ([`SessionManager::resume`]).
//! 3. **Expiry**: disconnected sessions past the grace period are
//!    expired and cleaned up.

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
