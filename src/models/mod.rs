//! Persisted record types.
//!
//! Field names mirror the wire format clients already speak (`readBy`,
//! `pubKey`, `firstMessageSent`), so a stored document serializes to
//! exactly what the events carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Opaque message payload: free-text content, a client-supplied timestamp,
/// and whatever key-exchange material the client attached. The server
/// validates presence of the required fields and relays the rest verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    #[serde(rename = "privKeyId")]
    pub priv_key_id: String,
    /// Additional key-exchange fields (identity keys, one-time prekeys,
    /// ephemeral keys, DH values, signatures). Never interpreted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub chatroom: Uuid,
    pub sender: Uuid,
    pub message: MessagePayload,
    #[serde(rename = "readBy")]
    pub read_by: BTreeSet<Uuid>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chatroom {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Sorted and deduplicated; the sorted set is the chatroom's identity
    /// for duplicate-creation checks.
    pub members: Vec<Uuid>,
    #[serde(rename = "firstMessageSent")]
    pub first_message_sent: bool,
}

impl Chatroom {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.binary_search(&user_id).is_ok()
    }
}

/// Normalize a member list into the canonical sorted, deduplicated form.
pub fn canonical_members(members: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let set: BTreeSet<Uuid> = members.into_iter().collect();
    set.into_iter().collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
}
