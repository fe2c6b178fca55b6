//! Abuse controls for Duochat.
//!
//! - [`BanStore`]: time-boxed bans keyed by user id. Expiry is computed
//!   on read; nothing ticks.
//! - [`ContentFilter`]: the seam where a moderation policy plugs in.
//!   Deciding what is abusive is the filter's job; enforcing the ban is
//!   the store's.

mod ban;
mod filter;

pub use ban::{BanRecord, BanStatus, BanStore};
pub use filter::{AllowAll, ContentFilter, WordListFilter};
