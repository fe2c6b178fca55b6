//! # Duochat
//!
//! Anonymous one-on-one chat over WebSocket.
//!
//! Visitors connect, get a server-assigned identity, and are paired with
//! the longest-waiting stranger. Messages are relayed only between the
//! two occupants of a room. A pluggable [`ContentFilter`] can flag a
//! message, which bans its sender for a configured time; ban status is
//! also served over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duochat::prelude::*;
//!
//! # async fn run() -> Result<(), DuochatError> {
//! let server = DuochatServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! [`ContentFilter`]: duochat_moderation::ContentFilter

pub mod config;
mod error;
mod gateway;
pub mod http;
mod server;

pub use error::DuochatError;
pub use server::{DuochatServer, DuochatServerBuilder};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::config::{GatewayConfig, ServerConfig};
    pub use crate::{DuochatError, DuochatServer, DuochatServerBuilder};
    pub use duochat_moderation::{AllowAll, BanStatus, BanStore, ContentFilter, WordListFilter};
    pub use duochat_protocol::{ClientEvent, JsonCodec, RoomId, ServerEvent, UserId};
    pub use duochat_session::SessionConfig;
}
