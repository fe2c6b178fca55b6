//! Wire protocol for Duochat.
//!
//! This crate defines what travels between the browser and the server:
//!
//! - **Identifiers** ([`UserId`], [`RoomId`]): opaque, server-minted.
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): the real-time channel
//!   vocabulary, one JSON object per frame.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): events to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (events) → Gateway (per-connection state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{BAN_NOTICE, ClientEvent, RoomId, ServerEvent, UserId};
