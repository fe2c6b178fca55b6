//! The waiting queue.

use std::collections::{BTreeMap, HashMap};

use duochat_protocol::UserId;
use tokio::time::Instant;

use crate::{RoomError, UserSender};

/// A user waiting for a partner.
#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub user_id: UserId,
    pub enqueued_at: Instant,
    /// Where to push `chat_started` once someone picks this user.
    pub sender: UserSender,
}

impl WaitingEntry {
    /// `false` once the user's connection task has gone away.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// FIFO of waiting users with O(log n) membership and removal.
///
/// Each entry gets a monotonically increasing ticket: `order` sorts by
/// ticket (oldest first), `index` finds a user's ticket without a scan.
/// Not synchronized; the [`Matchmaker`](crate::Matchmaker) owns it behind
/// its lock.
#[derive(Debug, Default)]
pub struct WaitingQueue {
    order: BTreeMap<u64, WaitingEntry>,
    index: HashMap<UserId, u64>,
    next_ticket: u64,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user at the back.
    ///
    /// # Errors
    /// [`RoomError::AlreadyQueued`] if the user is already waiting; the
    /// queue is left unchanged.
    pub fn enqueue(
        &mut self,
        user_id: UserId,
        sender: UserSender,
    ) -> Result<(), RoomError> {
        if self.index.contains_key(&user_id) {
            return Err(RoomError::AlreadyQueued(user_id));
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.index.insert(user_id, ticket);
        self.order.insert(
            ticket,
            WaitingEntry {
                user_id,
                enqueued_at: Instant::now(),
                sender,
            },
        );
        Ok(())
    }

    /// Pops the longest-waiting user.
    pub fn dequeue_oldest(&mut self) -> Option<WaitingEntry> {
        let (_, entry) = self.order.pop_first()?;
        self.index.remove(&entry.user_id);
        Some(entry)
    }

    /// Removes a user wherever they are in line. No-op if absent.
    pub fn remove(&mut self, user_id: UserId) -> bool {
        match self.index.remove(&user_id) {
            Some(ticket) => {
                self.order.remove(&ticket);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.index.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
