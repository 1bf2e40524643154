//! Session registry: connection id -> authenticated user + joined rooms.
//!
//! Kept separate from the broadcast registry so room-membership logic can be
//! exercised without a live transport. Sessions are process-local and die
//! with the connection; nothing here is persisted.

use crate::websocket::RoomId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Unique identifier for one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
struct Session {
    user_id: Uuid,
    rooms: HashSet<RoomId>,
}

#[derive(Default, Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly authenticated connection. The personal room is
    /// joined implicitly at handshake.
    pub async fn register(&self, conn: ConnectionId, user_id: Uuid) {
        let mut rooms = HashSet::new();
        rooms.insert(RoomId::User(user_id));
        self.inner
            .write()
            .await
            .insert(conn, Session { user_id, rooms });
    }

    /// Drop the session. Returns the rooms it had joined so the caller can
    /// clean up broadcast subscriptions.
    pub async fn remove(&self, conn: ConnectionId) -> Vec<RoomId> {
        self.inner
            .write()
            .await
            .remove(&conn)
            .map(|s| s.rooms.into_iter().collect())
            .unwrap_or_default()
    }

    pub async fn user_of(&self, conn: ConnectionId) -> Option<Uuid> {
        self.inner.read().await.get(&conn).map(|s| s.user_id)
    }

    pub async fn join_room(&self, conn: ConnectionId, room: RoomId) -> bool {
        match self.inner.write().await.get_mut(&conn) {
            Some(session) => session.rooms.insert(room),
            None => false,
        }
    }

    pub async fn leave_room(&self, conn: ConnectionId, room: RoomId) -> bool {
        match self.inner.write().await.get_mut(&conn) {
            Some(session) => session.rooms.remove(&room),
            None => false,
        }
    }

    pub async fn is_in_room(&self, conn: ConnectionId, room: RoomId) -> bool {
        self.inner
            .read()
            .await
            .get(&conn)
            .map(|s| s.rooms.contains(&room))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_joins_personal_room() {
        let sessions = SessionRegistry::new();
        let conn = ConnectionId::new();
        let user = Uuid::new_v4();
        sessions.register(conn, user).await;

        assert_eq!(sessions.user_of(conn).await, Some(user));
        assert!(sessions.is_in_room(conn, RoomId::User(user)).await);
    }

    #[tokio::test]
    async fn remove_returns_joined_rooms() {
        let sessions = SessionRegistry::new();
        let conn = ConnectionId::new();
        let user = Uuid::new_v4();
        let chatroom = Uuid::new_v4();
        sessions.register(conn, user).await;
        assert!(sessions.join_room(conn, RoomId::Chatroom(chatroom)).await);

        let mut rooms = sessions.remove(conn).await;
        rooms.sort_by_key(|r| format!("{r:?}"));
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&RoomId::Chatroom(chatroom)));
        assert!(rooms.contains(&RoomId::User(user)));
        assert_eq!(sessions.user_of(conn).await, None);
    }

    #[tokio::test]
    async fn join_on_unknown_connection_is_refused() {
        let sessions = SessionRegistry::new();
        let conn = ConnectionId::new();
        assert!(!sessions.join_room(conn, RoomId::Chatroom(Uuid::new_v4())).await);
    }
}
