//! Wire types for the real-time protocol.
//!
//! Events are internally tagged with `type`, matching the names clients
//! already use (`joinRoom`, `chatroomMessage`, ...). Inbound fields that the
//! protocol requires are `Option` so a missing parameter surfaces as a
//! distinct `MissingParameter` error instead of a blanket parse failure.

use crate::models::{Message, MessagePayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Inbound events from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "joinRoom")]
    JoinRoom {
        #[serde(rename = "chatroomId")]
        chatroom_id: Option<Uuid>,
    },

    #[serde(rename = "leaveRoom")]
    LeaveRoom {
        #[serde(rename = "chatroomId")]
        chatroom_id: Option<Uuid>,
    },

    #[serde(rename = "chatroomMessage")]
    ChatroomMessage {
        #[serde(rename = "chatroomId")]
        chatroom_id: Option<Uuid>,
        message: Option<IncomingPayload>,
    },

    /// Acknowledge that the sender of this event has read the listed
    /// messages. Identifiers arrive as raw strings and are parsed up front
    /// so one bad id rejects the whole call before any transaction opens.
    #[serde(rename = "readMessages")]
    ReadMessages {
        #[serde(rename = "messageIds")]
        message_ids: Option<Vec<String>>,
    },
}

/// Message payload as received, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingPayload {
    pub content: Option<String>,
    pub timestamp: Option<String>,
    #[serde(rename = "pubKey")]
    pub pub_key: Option<String>,
    #[serde(rename = "privKeyId")]
    pub priv_key_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outbound events from server to client or room.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    /// Handshake confirmation, scoped to the user's personal room.
    #[serde(rename = "joinedUserRoom")]
    JoinedUserRoom {
        #[serde(rename = "roomId")]
        room_id: Uuid,
    },

    /// Join/leave/deletion announcements.
    #[serde(rename = "notification")]
    Notification { message: String },

    /// A persisted message, fanned out to the chatroom's room.
    #[serde(rename = "newMessage")]
    NewMessage {
        #[serde(rename = "_id")]
        id: Uuid,
        chatroom: Uuid,
        sender: Uuid,
        message: MessagePayload,
    },

    /// First-message chatroom discovery, sent to each member's personal
    /// room with a per-recipient display name.
    #[serde(rename = "newChatroom")]
    NewChatroom {
        #[serde(rename = "_id")]
        id: Uuid,
        name: String,
        members: Vec<Uuid>,
    },

    #[serde(rename = "chatroomDeleted")]
    ChatroomDeleted { message: String },

    #[serde(rename = "error")]
    Error { message: String },
}

impl WsOutboundEvent {
    pub fn new_message(message: &Message) -> Self {
        WsOutboundEvent::NewMessage {
            id: message.id,
            chatroom: message.chatroom,
            sender: message.sender,
            message: message.message.clone(),
        }
    }

    /// Serialized wire form. Outbound events always serialize; a failure
    /// would be a bug in the event types themselves.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize outbound event");
            r#"{"type":"error","message":"internal serialization failure"}"#.to_string()
        })
    }
}
