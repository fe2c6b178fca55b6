//! Identifiers and real-time events.
//!
//! Every frame is one adjacently tagged JSON object:
//!
//! ```text
//! {"event": "chat_started", "data": {"room": 7}}
//! {"event": "waiting_for_partner"}
//! ```
//!
//! Unit events carry no `data` key. Events produced inside a room
//! (`message`, `partner_disconnected`) name that room.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text of the `banned` notice pushed to a client.
pub const BAN_NOTICE: &str =
    "You are banned for sending inappropriate content.";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Server-assigned identity of a visitor.
///
/// Minted fresh per new session and never reused while the process
/// lives. Serializes as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Identifier of a two-party chat room. Minted fresh per pairing from an
/// increasing counter, so a later room always compares greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Enter matchmaking. When already paired this means "new chat":
    /// the current room is dissolved first.
    FindPartner,

    /// Chat text for the current partner.
    Message { message: String },

    /// Leave the current room or the waiting queue without looking for
    /// someone new.
    LeaveChat,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Identity assigned on connect. `token` lets the same browser
    /// reclaim `user_id` on a later connection (`?resume=<token>`).
    Connected { user_id: UserId, token: String },

    /// Pairing succeeded.
    ChatStarted { room: RoomId },

    /// No partner available; the user is queued.
    WaitingForPartner,

    /// A relayed chat message. Both occupants receive it; `user_id` is
    /// the true sender so each side can tell its own lines apart.
    Message {
        room: RoomId,
        message: String,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// The other occupant left; `room` is gone.
    PartnerDisconnected { room: RoomId },

    /// Ban notice. `remaining_time` is whole seconds, derived when the
    /// notice was sent.
    Banned { message: String, remaining_time: u64 },
}

impl ServerEvent {
    /// Builds a `banned` notice with the standard text.
    pub fn banned(remaining_time: u64) -> Self {
        Self::Banned {
            message: BAN_NOTICE.to_string(),
            remaining_time,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The browser client matches on these exact JSON shapes.

    use super::*;

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(UserId(7).to_string(), "U-7");
        assert_eq!(RoomId(3).to_string(), "R-3");
    }

    #[test]
    fn test_client_find_partner_decodes_without_data() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"find_partner"}"#).unwrap();
        assert_eq!(event, ClientEvent::FindPartner);
    }

    #[test]
    fn test_client_message_decodes_payload() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"message","data":{"message":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Message {
                message: "hi".into()
            }
        );
    }

    #[test]
    fn test_client_leave_chat_decodes() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"leave_chat"}"#).unwrap();
        assert_eq!(event, ClientEvent::LeaveChat);
    }

    #[test]
    fn test_client_unknown_event_returns_error() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"event":"fly_to_moon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_message_without_text_returns_error() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"event":"message","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_connected_json_format() {
        let event = ServerEvent::Connected {
            user_id: UserId(5),
            token: "abc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connected");
        assert_eq!(json["data"]["user_id"], 5);
        assert_eq!(json["data"]["token"], "abc");
    }

    #[test]
    fn test_server_chat_started_json_format() {
        let json =
            serde_json::to_value(&ServerEvent::ChatStarted { room: RoomId(9) })
                .unwrap();
        assert_eq!(json["event"], "chat_started");
        assert_eq!(json["data"]["room"], 9);
    }

    #[test]
    fn test_server_unit_events_have_no_data() {
        let json =
            serde_json::to_value(&ServerEvent::WaitingForPartner).unwrap();
        assert_eq!(json, serde_json::json!({"event": "waiting_for_partner"}));
    }

    #[test]
    fn test_server_partner_disconnected_names_room() {
        let json = serde_json::to_value(&ServerEvent::PartnerDisconnected {
            room: RoomId(4),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "partner_disconnected", "data": {"room": 4}})
        );
    }

    #[test]
    fn test_room_ids_order_by_mint_sequence() {
        assert!(RoomId(2) > RoomId(1));
    }

    #[test]
    fn test_server_message_json_format() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = ServerEvent::Message {
            room: RoomId(2),
            message: "hi".into(),
            user_id: UserId(1),
            timestamp,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "message");
        assert_eq!(json["data"]["room"], 2);
        assert_eq!(json["data"]["message"], "hi");
        assert_eq!(json["data"]["user_id"], 1);
        assert_eq!(json["data"]["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_server_banned_uses_standard_notice() {
        let json = serde_json::to_value(&ServerEvent::banned(50)).unwrap();
        assert_eq!(json["event"], "banned");
        assert_eq!(json["data"]["message"], BAN_NOTICE);
        assert_eq!(json["data"]["remaining_time"], 50);
    }
}
