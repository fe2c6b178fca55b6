//! Per-connection gateway: identity, matchmaking, chat, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this
//! gateway. The flow is:
//!   1. Resume or create a session → push `connected`
//!   2. Enter matchmaking if auto-match is on
//!   3. Loop: inbound frames → client events; outbound channel → socket
//!   4. On exit: leave room or queue, mark the session disconnected
//!
//! Everything the user receives goes through one unbounded channel, so
//! events from the matchmaker, the room actor and this task reach the
//! socket in the order they were produced. Events still queued from a
//! room the user has since left are dropped before they reach the socket.

use std::sync::Arc;

use duochat_protocol::{ClientEvent, Codec, RoomId, ServerEvent, UserId};
use duochat_room::{LeaveOutcome, MatchOutcome, RoomError, UserSender};
use duochat_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::server::ServerState;
use crate::DuochatError;

/// Where the user stands, as far as this connection knows.
///
/// Updated from outbound events as they are written, so it reflects what
/// the client has been told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Waiting,
    Paired(RoomId),
    Banned,
}

impl Phase {
    fn after(self, event: &ServerEvent) -> Self {
        match event {
            ServerEvent::Connected { .. } => Self::Idle,
            ServerEvent::ChatStarted { room } => Self::Paired(*room),
            ServerEvent::WaitingForPartner => Self::Waiting,
            ServerEvent::PartnerDisconnected { room } if self == Self::Paired(*room) => {
                Self::Idle
            }
            ServerEvent::Banned { .. } => Self::Banned,
            ServerEvent::PartnerDisconnected { .. } | ServerEvent::Message { .. } => self,
        }
    }
}

/// Filters outbound events against the rooms this connection has left.
///
/// Room ids only grow and a user is in one room at a time, so every room
/// up to the last one left is over for this user.
#[derive(Debug, Default, Clone, Copy)]
struct RoomFence {
    left: Option<RoomId>,
}

impl RoomFence {
    fn leave(&mut self, room: RoomId) {
        self.left = self.left.max(Some(room));
    }

    /// `true` if `event` should still reach the client in `phase`.
    fn admits(&self, phase: Phase, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::ChatStarted { room } => self.left < Some(*room),
            ServerEvent::Message { room, .. }
            | ServerEvent::PartnerDisconnected { room } => phase == Phase::Paired(*room),
            _ => true,
        }
    }
}

/// Drop guard that releases the user if the gateway task ends without
/// reaching its own cleanup (e.g. a panic).
///
/// `Drop` is synchronous, so the async release is spawned.
struct ReleaseGuard<C: Codec> {
    user_id: UserId,
    state: Arc<ServerState<C>>,
    armed: bool,
}

impl<C: Codec> ReleaseGuard<C> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C: Codec> Drop for ReleaseGuard<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let user_id = self.user_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move { release(&state, user_id).await });
    }
}

/// Takes the user out of matchmaking and starts their resume grace.
async fn release<C: Codec>(state: &ServerState<C>, user_id: UserId) {
    let left = state.matchmaker.leave(user_id).await;
    let mut sessions = state.sessions.lock().await;
    if let Err(e) = sessions.disconnect(user_id) {
        tracing::debug!(%user_id, error = %e, "disconnect without session");
    }
    tracing::info!(%user_id, ?left, "user released");
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), DuochatError> {
    let conn_id = conn.id();
    let (user_id, token) = identify(&conn, &state).await;
    tracing::info!(%conn_id, %user_id, "user connected");

    let mut guard = ReleaseGuard {
        user_id,
        state: Arc::clone(&state),
        armed: true,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut gateway = Gateway {
        user_id,
        state: Arc::clone(&state),
        tx,
        phase: Phase::Idle,
        fence: RoomFence::default(),
    };
    gateway.push(ServerEvent::Connected { user_id, token });
    if state.config.auto_match {
        gateway.find_partner().await;
    }

    let result = gateway.run(&conn, rx).await;

    release(&state, user_id).await;
    guard.disarm();
    let _ = conn.close().await;
    result
}

/// Re-attaches the user named by `?resume=<token>`, or mints a new one.
async fn identify<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> (UserId, String) {
    let mut sessions = state.sessions.lock().await;

    if let Some(token) = conn.query_param("resume") {
        match sessions.resume(token) {
            Ok(session) => {
                return (session.user_id, session.resume_token.clone());
            }
            Err(e) => {
                tracing::debug!(error = %e, "resume refused, new identity");
            }
        }
    }

    let session = sessions.create();
    (session.user_id, session.resume_token.clone())
}

struct Gateway<C: Codec> {
    user_id: UserId,
    state: Arc<ServerState<C>>,
    /// This connection's outbound channel; the matchmaker and room
    /// actors hold clones.
    tx: UserSender,
    phase: Phase,
    fence: RoomFence,
}

impl<C: Codec> Gateway<C> {
    /// Multiplexes inbound frames and outbound events until the client
    /// goes away, idles out (when a timeout is configured), or a write
    /// fails.
    async fn run(
        &mut self,
        conn: &WebSocketConnection,
        mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Result<(), DuochatError> {
        let user_id = self.user_id;
        let idle_timeout = self.state.config.idle_timeout;
        // Never fires unless a timeout is configured.
        let idle = tokio::time::sleep(idle_timeout.unwrap_or_default());
        tokio::pin!(idle);

        loop {
            tokio::select! {
                () = &mut idle, if idle_timeout.is_some() => {
                    tracing::info!(%user_id, "connection idle, closing");
                    return Ok(());
                }

                frame = conn.recv() => {
                    let data = match frame {
                        Ok(Some(data)) => data,
                        Ok(None) => {
                            tracing::info!(%user_id, "connection closed");
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::debug!(%user_id, error = %e, "recv error");
                            return Ok(());
                        }
                    };
                    if let Some(timeout) = idle_timeout {
                        idle.as_mut().reset(Instant::now() + timeout);
                    }
                    self.handle_frame(&data).await;
                }

                // `self.tx` keeps the channel open, so this never yields
                // `None`.
                Some(event) = rx.recv() => {
                    if !self.fence.admits(self.phase, &event) {
                        tracing::debug!(%user_id, phase = ?self.phase, "stale room event dropped");
                        continue;
                    }
                    self.phase = self.phase.after(&event);
                    let bytes = self.state.codec.encode(&event)?;
                    conn.send(&bytes).await?;
                }
            }
        }
    }

    async fn handle_frame(&mut self, data: &[u8]) {
        let event: ClientEvent = match self.state.codec.decode(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(user_id = %self.user_id, error = %e, "undecodable frame dropped");
                return;
            }
        };

        match event {
            ClientEvent::FindPartner => self.find_partner().await,
            ClientEvent::Message { message } => self.chat(message).await,
            ClientEvent::LeaveChat => {
                self.leave().await;
            }
        }
    }

    /// Leaves the room or queue. The client gets no event for its own
    /// leave, so the phase and fence are moved here.
    async fn leave(&mut self) -> LeaveOutcome {
        let left = self.state.matchmaker.leave(self.user_id).await;
        if let LeaveOutcome::LeftRoom(room) = left {
            self.fence.leave(room);
        }
        self.phase = Phase::Idle;
        tracing::debug!(user_id = %self.user_id, ?left, "left matchmaking");
        left
    }

    async fn find_partner(&mut self) {
        let user_id = self.user_id;
        // "New chat" leaves this room, possibly before its chat_started
        // was written.
        let previous = self.state.matchmaker.registry().room_of(user_id).await;
        match self.state.matchmaker.request_partner(user_id, &self.tx).await {
            Ok(MatchOutcome::Banned { remaining_secs }) => {
                self.push(ServerEvent::banned(remaining_secs));
            }
            Ok(_) => {
                if let Some(room) = previous {
                    self.fence.leave(room);
                }
            }
            Err(RoomError::AlreadyQueued(_)) => {
                tracing::debug!(%user_id, "find_partner while already waiting");
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "matchmaking failed");
            }
        }
    }

    async fn chat(&mut self, message: String) {
        let user_id = self.user_id;
        let config = &self.state.config;
        let text = message.trim();

        if text.is_empty() || text.chars().count() > config.max_message_len {
            tracing::debug!(%user_id, len = text.len(), "message dropped: length");
            return;
        }

        let status = self.state.bans.is_banned(user_id).await;
        if status.banned {
            self.push(ServerEvent::banned(status.remaining_secs));
            return;
        }

        if self.state.filter.is_flagged(text) {
            self.state.bans.ban(user_id, config.ban_duration).await;
            let left = self.leave().await;
            tracing::info!(%user_id, ?left, "message flagged, user banned");
            let status = self.state.bans.is_banned(user_id).await;
            self.push(ServerEvent::banned(status.remaining_secs));
            return;
        }

        if !matches!(self.phase, Phase::Paired(_)) {
            tracing::debug!(%user_id, phase = ?self.phase, "message dropped: not paired");
            return;
        }

        if let Err(e) = self
            .state
            .matchmaker
            .registry()
            .relay(user_id, text.to_string())
            .await
        {
            tracing::debug!(%user_id, error = %e, "message dropped");
        }
    }

    /// Queues an event for this connection.
    fn push(&self, event: ServerEvent) {
        // Our own receiver lives as long as `self`.
        let _ = self.tx.send(event);
    }
}
