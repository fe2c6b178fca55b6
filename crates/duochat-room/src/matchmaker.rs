//! The matchmaker: turns a user into either a queue entry or a room.

use std::sync::Arc;

use duochat_moderation::BanStore;
use duochat_protocol::{RoomId, ServerEvent, UserId};
use tokio::sync::Mutex;

use crate::{RoomError, RoomRegistry, UserSender, WaitingQueue};

/// Result of [`Matchmaker::request_partner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Paired into a fresh room; both sides got `chat_started`.
    Paired(RoomId),
    /// Nobody available; the user is queued and got
    /// `waiting_for_partner`.
    Waiting,
    /// The user is banned. Nothing was queued or paired, and no event
    /// was pushed: the caller owns the ban notice.
    Banned { remaining_secs: u64 },
}

/// Result of [`Matchmaker::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The user's room was dissolved and the partner notified.
    LeftRoom(RoomId),
    /// The user was taken out of the waiting queue.
    LeftQueue,
    /// The user was neither paired nor waiting.
    NotPresent,
}

/// Pairs waiting users.
///
/// The queue mutex is the single serialization point for everything
/// that changes membership: dequeue + room creation, "new chat", and
/// leave. Two concurrent requests can therefore never take the same
/// candidate, and a leave can never interleave with a pairing.
pub struct Matchmaker {
    queue: Mutex<WaitingQueue>,
    registry: Arc<RoomRegistry>,
    bans: Arc<BanStore>,
}

impl Matchmaker {
    pub fn new(registry: Arc<RoomRegistry>, bans: Arc<BanStore>) -> Self {
        Self {
            queue: Mutex::new(WaitingQueue::new()),
            registry,
            bans,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Finds `user_id` a partner.
    ///
    /// A user already in a room leaves it first, so this doubles as
    /// "new chat". The old room has fully stopped before the new one
    /// opens, so its events always precede the new `chat_started`. Dequeued candidates whose connection has closed are
    /// discarded and the next one is tried; when the queue runs dry the
    /// user is enqueued.
    ///
    /// # Errors
    /// [`RoomError::AlreadyQueued`] if the user is already waiting.
    pub async fn request_partner(
        &self,
        user_id: UserId,
        sender: &UserSender,
    ) -> Result<MatchOutcome, RoomError> {
        let status = self.bans.is_banned(user_id).await;
        if status.banned {
            tracing::debug!(%user_id, "banned user refused matchmaking");
            return Ok(MatchOutcome::Banned {
                remaining_secs: status.remaining_secs,
            });
        }

        let mut queue = self.queue.lock().await;

        if queue.contains(user_id) {
            return Err(RoomError::AlreadyQueued(user_id));
        }
        if let Some(old) = self.registry.leave_room(user_id).await {
            tracing::info!(%user_id, room_id = %old, "left room for new chat");
        }

        while let Some(candidate) = queue.dequeue_oldest() {
            if !candidate.is_connected() {
                let e = RoomError::PartnerUnavailable(candidate.user_id);
                tracing::debug!(%user_id, error = %e, "skipping stale entry");
                continue;
            }

            let partner_id = candidate.user_id;
            let partner_tx = candidate.sender;
            let room = self
                .registry
                .create_room(
                    (user_id, sender.clone()),
                    (partner_id, partner_tx.clone()),
                )
                .await?;

            let _ = sender.send(ServerEvent::ChatStarted { room });
            let _ = partner_tx.send(ServerEvent::ChatStarted { room });
            tracing::info!(%user_id, %partner_id, room_id = %room, "paired");
            return Ok(MatchOutcome::Paired(room));
        }

        queue.enqueue(user_id, sender.clone())?;
        let _ = sender.send(ServerEvent::WaitingForPartner);
        tracing::debug!(%user_id, waiting = queue.len(), "queued");
        Ok(MatchOutcome::Waiting)
    }

    /// Takes `user_id` out of whatever it is in.
    ///
    /// A paired user's room is dissolved (the partner gets
    /// `partner_disconnected`); a waiting user is dequeued. Once this
    /// returns, no later pairing can select the user.
    pub async fn leave(&self, user_id: UserId) -> LeaveOutcome {
        let mut queue = self.queue.lock().await;

        if let Some(room) = self.registry.leave_room(user_id).await {
            return LeaveOutcome::LeftRoom(room);
        }
        if queue.remove(user_id) {
            tracing::debug!(%user_id, "left waiting queue");
            return LeaveOutcome::LeftQueue;
        }
        LeaveOutcome::NotPresent
    }

    /// Returns `true` if `user_id` is waiting for a partner.
    pub async fn is_waiting(&self, user_id: UserId) -> bool {
        self.queue.lock().await.contains(user_id)
    }

    /// Number of users waiting.
    pub async fn waiting_count(&self) -> usize {
        self.queue.lock().await.len()
    }
}
