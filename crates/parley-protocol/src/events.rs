//! Event types for the Parley protocol.
//!
//! Events are JSON objects discriminated by a `type` field. Field names
//! follow the client-facing camelCase convention.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Author name used for join/leave notices generated by the server.
pub const SYSTEM_AUTHOR: &str = "System";

/// A chat message, both as broadcast on the wire and as persisted in the
/// message store.
///
/// Messages are immutable once created. Ordering within a room is the
/// order in which the engine accepted them; the timestamp is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the author.
    pub author: String,
    /// Message body.
    pub text: String,
    /// ISO-8601 timestamp assigned by the server at creation.
    pub timestamp: String,
    /// Room the message was sent to.
    pub room: String,
}

impl ChatMessage {
    /// Create a new message with a server-assigned timestamp.
    #[must_use]
    pub fn new(
        author: impl Into<String>,
        text: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            room: room.into(),
        }
    }

    /// Create a system notice ("X has joined the room" and friends).
    ///
    /// Notices are broadcast like regular messages but never persisted.
    #[must_use]
    pub fn system(text: impl Into<String>, room: impl Into<String>) -> Self {
        Self::new(SYSTEM_AUTHOR, text, room)
    }
}

/// A single entry in a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Display name of the member.
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Member {
    /// Create a roster entry.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Join a room, leaving any prior room first.
    #[serde(rename = "join")]
    Join {
        /// Display name to use in the room.
        #[serde(rename = "displayName")]
        display_name: String,
        /// Room to join.
        room: String,
    },

    /// Send a message to the current room.
    #[serde(rename = "sendMessage")]
    SendMessage {
        /// Message body.
        text: String,
    },

    /// The client started composing a message.
    #[serde(rename = "typing")]
    Typing,

    /// The client stopped composing without sending.
    #[serde(rename = "stopTyping")]
    StopTyping,

    /// Explicitly leave the current room prior to a new join.
    #[serde(rename = "leaveRoom")]
    LeaveRoom {
        /// Display name the client joined with.
        #[serde(rename = "displayName")]
        display_name: String,
        /// Room being left.
        room: String,
    },
}

/// An event sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chat message or system notice, broadcast to a room.
    #[serde(rename = "message")]
    Message(ChatMessage),

    /// The persisted history of a room, sent once to a joiner.
    #[serde(rename = "chatHistory")]
    ChatHistory {
        /// Messages in insertion order.
        messages: Vec<ChatMessage>,
    },

    /// The refreshed roster of a room.
    #[serde(rename = "roomData")]
    RoomData {
        /// Room name.
        room: String,
        /// Current members, order-independent.
        members: Vec<Member>,
    },

    /// The set of names currently typing in a room.
    #[serde(rename = "typingStatus")]
    TypingStatus {
        /// Room name.
        room: String,
        /// Display names currently typing.
        typing: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_join() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join","displayName":"Alice","room":"general"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                display_name: "Alice".to_string(),
                room: "general".to_string(),
            }
        );
    }

    #[test]
    fn test_client_event_typing_empty_payload() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"typing"}"#).unwrap();
        assert_eq!(event, ClientEvent::Typing);

        let event: ClientEvent = serde_json::from_str(r#"{"type":"stopTyping"}"#).unwrap();
        assert_eq!(event, ClientEvent::StopTyping);
    }

    #[test]
    fn test_server_event_message_shape() {
        let msg = ChatMessage {
            author: "Alice".to_string(),
            text: "hi".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            room: "general".to_string(),
        };
        let json = serde_json::to_value(ServerEvent::Message(msg)).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["author"], "Alice");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["room"], "general");
    }

    #[test]
    fn test_server_event_room_data_shape() {
        let event = ServerEvent::RoomData {
            room: "general".to_string(),
            members: vec![Member::new("Alice"), Member::new("Bob")],
        };
        let json = serde_json::to_value(event).unwrap();

        assert_eq!(json["type"], "roomData");
        assert_eq!(json["members"][0]["displayName"], "Alice");
        assert_eq!(json["members"][1]["displayName"], "Bob");
    }

    #[test]
    fn test_system_notice() {
        let notice = ChatMessage::system("Alice has joined the room", "general");
        assert_eq!(notice.author, SYSTEM_AUTHOR);
        assert_eq!(notice.room, "general");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let msg = ChatMessage::new("Alice", "hi", "general");
        assert!(chrono::DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
    }
}
