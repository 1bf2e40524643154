use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::session::ConnectionId;

pub mod handlers;
pub mod message_types;

/// A broadcast group. Chatroom rooms carry message traffic; each user's
/// personal room carries out-of-band notifications (new chatroom, chatroom
/// deletion) and is joined automatically at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    Chatroom(Uuid),
    User(Uuid),
}

#[derive(Default)]
struct RegistryInner {
    /// Outbound channel per connection, registered at handshake.
    connections: HashMap<ConnectionId, UnboundedSender<String>>,
    /// Room membership at the transport level.
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
}

/// Room registry for WebSocket fan-out.
///
/// A connection registers one outbound channel; rooms hold connection ids
/// and broadcasts resolve the channel at send time. Dead connections are
/// dropped on send failure rather than retried; the receiving client
/// recovers any gap by re-fetching.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel. The receiver is drained by
    /// the connection's session actor.
    pub async fn register_connection(&self, conn: ConnectionId) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.inner.write().await.connections.insert(conn, tx);
        rx
    }

    pub async fn join(&self, room: RoomId, conn: ConnectionId) {
        let mut guard = self.inner.write().await;
        let members = guard.rooms.entry(room).or_default();
        if !members.contains(&conn) {
            members.push(conn);
            tracing::debug!(?room, %conn, total = members.len(), "joined room");
        }
    }

    pub async fn leave(&self, room: RoomId, conn: ConnectionId) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&room) {
            members.retain(|c| *c != conn);
            if members.is_empty() {
                guard.rooms.remove(&room);
            }
        }
    }

    /// Remove a connection's channel and its membership in every room it
    /// joined. Called on disconnect with the room list owned by the session
    /// registry.
    pub async fn remove_connection(&self, conn: ConnectionId, rooms: &[RoomId]) {
        let mut guard = self.inner.write().await;
        guard.connections.remove(&conn);
        for room in rooms {
            if let Some(members) = guard.rooms.get_mut(room) {
                members.retain(|c| *c != conn);
                if members.is_empty() {
                    guard.rooms.remove(room);
                }
            }
        }
    }

    /// Send to a single connection. Best-effort.
    pub async fn send_to(&self, conn: ConnectionId, msg: String) {
        let guard = self.inner.read().await;
        if let Some(sender) = guard.connections.get(&conn) {
            let _ = sender.send(msg);
        }
    }

    /// Broadcast to all current members of a room. Best-effort and at least
    /// once per live connection: a send failure means the receiver is gone,
    /// and that connection is dropped from the room instead of retried.
    pub async fn broadcast(&self, room: RoomId, msg: String) {
        let mut guard = self.inner.write().await;
        let RegistryInner { connections, rooms } = &mut *guard;
        if let Some(members) = rooms.get_mut(&room) {
            let before = members.len();
            members.retain(|conn| match connections.get(conn) {
                Some(sender) => sender.send(msg.clone()).is_ok(),
                None => false,
            });
            let dropped = before - members.len();
            if dropped > 0 {
                tracing::debug!(?room, dropped, "cleaned up dead members during broadcast");
            }
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    pub async fn member_count(&self, room: RoomId) -> usize {
        let guard = self.inner.read().await;
        guard.rooms.get(&room).map(|v| v.len()).unwrap_or(0)
    }
}
