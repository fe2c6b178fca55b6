//! Room registry: who is in which room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use duochat_protocol::{RoomId, UserId};
use tokio::sync::RwLock;

use crate::room::spawn_room;
use crate::{RoomError, RoomHandle, UserSender};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Tracks active rooms by occupant.
///
/// Both occupants of a room map to the same handle, and a user maps to
/// at most one handle: that is the "one room at a time" invariant.
/// Mutations (create, leave) are driven by the
/// [`Matchmaker`](crate::Matchmaker) under its lock; relays only read.
pub struct RoomRegistry {
    members: RwLock<HashMap<UserId, RoomHandle>>,
    next_room_id: AtomicU64,
    channel_size: usize,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_channel_size(DEFAULT_CHANNEL_SIZE)
    }

    pub fn with_channel_size(channel_size: usize) -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            next_room_id: AtomicU64::new(1),
            channel_size,
        }
    }

    /// Opens a room for `a` and `b` and maps both to it.
    ///
    /// Room ids come from a counter and are never reused.
    ///
    /// # Errors
    /// - [`RoomError::SelfPairing`] if `a` and `b` are the same user
    /// - [`RoomError::AlreadyInRoom`] if either is already in a room
    pub async fn create_room(
        &self,
        a: (UserId, UserSender),
        b: (UserId, UserSender),
    ) -> Result<RoomId, RoomError> {
        if a.0 == b.0 {
            return Err(RoomError::SelfPairing(a.0));
        }

        let mut members = self.members.write().await;
        for user in [a.0, b.0] {
            if let Some(existing) = members.get(&user) {
                return Err(RoomError::AlreadyInRoom(user, existing.room_id()));
            }
        }

        let room_id =
            RoomId(self.next_room_id.fetch_add(1, Ordering::Relaxed));
        let (user_a, user_b) = (a.0, b.0);
        let handle = spawn_room(room_id, a, b, self.channel_size);
        members.insert(user_a, handle.clone());
        members.insert(user_b, handle);

        tracing::info!(%room_id, %user_a, %user_b, "room created");
        Ok(room_id)
    }

    /// Relays `text` from `sender` to their room.
    ///
    /// # Errors
    /// - [`RoomError::NotInRoom`] if the sender has no room
    /// - [`RoomError::Unavailable`] if the room dissolved in the meantime
    pub async fn relay(
        &self,
        sender: UserId,
        text: String,
    ) -> Result<(), RoomError> {
        // Clone the handle and release the lock before awaiting the
        // actor's channel.
        let handle = self
            .members
            .read()
            .await
            .get(&sender)
            .cloned()
            .ok_or(RoomError::NotInRoom(sender))?;

        handle.relay(sender, text).await
    }

    /// Dissolves `user_id`'s room, if any, and returns its id.
    ///
    /// Both occupants are unmapped before the actor is told, then this
    /// waits for the actor to stop. Once it returns, the room's last
    /// relay and the partner's `partner_disconnected` are already queued
    /// ahead of anything a new room could send. The leaver receives
    /// nothing.
    pub async fn leave_room(&self, user_id: UserId) -> Option<RoomId> {
        let handle = {
            let mut members = self.members.write().await;
            let handle = members.remove(&user_id)?;
            if let Some(partner) = handle.partner_of(user_id) {
                members.remove(&partner);
            }
            handle
        };

        let room_id = handle.room_id();
        if let Err(e) = handle.dissolve(user_id).await {
            tracing::debug!(%room_id, error = %e, "room actor already gone");
        }
        tracing::info!(
            %room_id,
            leaver = %user_id,
            lifetime_secs = handle.created_at().elapsed().as_secs(),
            "room dissolved"
        );
        Some(room_id)
    }

    /// The room `user_id` is in, if any.
    pub async fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.members
            .read()
            .await
            .get(&user_id)
            .map(RoomHandle::room_id)
    }

    /// `user_id`'s current partner, if any.
    pub async fn partner_of(&self, user_id: UserId) -> Option<UserId> {
        self.members
            .read()
            .await
            .get(&user_id)
            .and_then(|h| h.partner_of(user_id))
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.members.read().await.len() / 2
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
