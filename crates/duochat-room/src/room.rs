//! Room actor: an isolated Tokio task that owns one two-party chat.
//!
//! The actor holds the only copies of its occupants' senders that the
//! room layer ever uses, so a relay physically cannot reach a third
//! party. Its command channel is FIFO, which gives per-sender ordering
//! within the room, and means a dissolve is handled only after every
//! relay queued ahead of it.

use chrono::Utc;
use duochat_protocol::{RoomId, ServerEvent, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::RoomError;

/// Outbound channel into one connection's gateway task.
pub type UserSender = mpsc::UnboundedSender<ServerEvent>;

pub(crate) enum RoomCommand {
    /// Fan a chat line out to both occupants.
    Relay { sender: UserId, text: String },

    /// `leaver` is gone: tell the other occupant, ack on `done` and stop.
    Dissolve {
        leaver: UserId,
        done: oneshot::Sender<()>,
    },
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    members: [UserId; 2],
    created_at: Instant,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Occupants in pairing order: the requester first, then the user
    /// taken from the queue.
    pub fn members(&self) -> [UserId; 2] {
        self.members
    }

    /// When the room was opened.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The other occupant, or `None` if `user_id` isn't in this room.
    pub fn partner_of(&self, user_id: UserId) -> Option<UserId> {
        match self.members {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    /// Queues a chat line for relay.
    pub(crate) async fn relay(
        &self,
        sender: UserId,
        text: String,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Relay { sender, text })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Tells the actor that `leaver` left and waits until it has stopped.
    ///
    /// When this returns `Ok`, every event the room will ever produce is
    /// already in its occupants' channels.
    pub(crate) async fn dissolve(
        &self,
        leaver: UserId,
    ) -> Result<(), RoomError> {
        let (done, stopped) = oneshot::channel();
        self.sender
            .send(RoomCommand::Dissolve { leaver, done })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        stopped.await.map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Chat text stays out of logs.
            Self::Relay { sender, .. } => {
                f.debug_struct("Relay").field("sender", sender).finish()
            }
            Self::Dissolve { leaver, .. } => {
                f.debug_struct("Dissolve").field("leaver", leaver).finish()
            }
        }
    }
}

struct RoomActor {
    room_id: RoomId,
    members: [(UserId, UserSender); 2],
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::debug!(room_id = %self.room_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Relay { sender, text } => {
                    self.handle_relay(sender, text);
                }
                RoomCommand::Dissolve { leaver, done } => {
                    self.handle_dissolve(leaver);
                    // Later commands are dropped unseen.
                    self.receiver.close();
                    let _ = done.send(());
                    break;
                }
            }
        }

        tracing::debug!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle_relay(&self, sender: UserId, text: String) {
        if !self.members.iter().any(|(id, _)| *id == sender) {
            tracing::warn!(
                room_id = %self.room_id,
                %sender,
                "relay from non-member, ignoring"
            );
            return;
        }

        let event = ServerEvent::Message {
            room: self.room_id,
            message: text,
            user_id: sender,
            timestamp: Utc::now(),
        };
        // Both occupants get the line; the sender's copy is its echo.
        for (_, tx) in &self.members {
            let _ = tx.send(event.clone());
        }
    }

    fn handle_dissolve(&self, leaver: UserId) {
        for (id, tx) in &self.members {
            if *id != leaver {
                let _ = tx.send(ServerEvent::PartnerDisconnected {
                    room: self.room_id,
                });
            }
        }
        tracing::debug!(room_id = %self.room_id, %leaver, "partner notified");
    }
}

/// Spawns a room actor for `a` and `b` and returns its handle.
///
/// `channel_size` bounds the command queue; relays wait when it is full.
pub(crate) fn spawn_room(
    room_id: RoomId,
    a: (UserId, UserSender),
    b: (UserId, UserSender),
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let members = [a.0, b.0];

    let actor = RoomActor {
        room_id,
        members: [a, b],
        receiver: rx,
    };
    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        members,
        created_at: Instant::now(),
        sender: tx,
    }
}
