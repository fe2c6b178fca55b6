//! Matchmaking and room lifecycle for Duochat.
//!
//! Each room is a two-member actor task that owns both occupants'
//! outbound channels, so a relay can only ever reach those two.
//!
//! # Key types
//!
//! - [`WaitingQueue`]: FIFO of users seeking a partner
//! - [`RoomRegistry`]: user → room membership, relay entry point
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Matchmaker`]: the single serialization point that pairs users
//!
//! # Locking
//!
//! The matchmaker's queue mutex is the only exclusive section; pairing,
//! "new chat" and leave all run under it. The registry's `RwLock` is
//! always taken after it, never before, and relays take it only for
//! reading.

mod error;
mod matchmaker;
mod queue;
mod registry;
mod room;

pub use error::RoomError;
pub use matchmaker::{LeaveOutcome, MatchOutcome, Matchmaker};
pub use queue::{WaitingEntry, WaitingQueue};
pub use registry::RoomRegistry;
pub use room::{RoomHandle, UserSender};
