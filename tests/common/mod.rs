//! Shared harness: an `AppState` over the in-memory store plus simulated
//! connections driven straight through the transport-free handlers.

// Not every test binary uses every helper.
#![allow(dead_code)]

use chat_relay_service::config::{Config, RetryPolicy};
use chat_relay_service::models::User;
use chat_relay_service::session::ConnectionId;
use chat_relay_service::state::AppState;
use chat_relay_service::store::memory::MemoryStore;
use chat_relay_service::store::DocumentStore;
use chat_relay_service::websocket::handlers;
use chat_relay_service::websocket::message_types::IncomingPayload;
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(Config {
        port: 0,
        jwt_secret: "test-secret".into(),
        reclamation: RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(1),
        },
    });
    (AppState::new(store.clone(), config), store)
}

/// Seed a user record and open a simulated, authenticated connection.
pub async fn connect(state: &AppState, username: &str) -> (Uuid, ConnectionId, Receiver) {
    let user_id = Uuid::new_v4();
    state
        .store
        .insert_user(User {
            id: user_id,
            username: username.into(),
        })
        .await
        .unwrap();

    let conn = ConnectionId::new();
    let mut rx = handlers::handshake(state, conn, user_id).await;

    // Drain the handshake confirmation.
    let confirmation = rx.recv().await.unwrap();
    assert!(confirmation.contains("joinedUserRoom"));

    (user_id, conn, Receiver { rx })
}

pub struct Receiver {
    rx: UnboundedReceiver<String>,
}

impl Receiver {
    /// Next event, parsed. Panics when the channel is empty: events are
    /// delivered synchronously by the handlers, so anything expected is
    /// already buffered.
    pub fn next(&mut self) -> serde_json::Value {
        let raw = self.rx.try_recv().expect("expected a buffered event");
        serde_json::from_str(&raw).expect("events are valid JSON")
    }

    pub fn try_next(&mut self) -> Option<serde_json::Value> {
        self.rx
            .try_recv()
            .ok()
            .map(|raw| serde_json::from_str(&raw).expect("events are valid JSON"))
    }

    /// Skip events until one with the given `type` arrives.
    pub fn next_of_type(&mut self, event_type: &str) -> serde_json::Value {
        loop {
            let event = self.next();
            if event["type"] == event_type {
                return event;
            }
        }
    }
}

pub fn payload(content: &str) -> IncomingPayload {
    IncomingPayload {
        content: Some(content.into()),
        timestamp: Some("2024-12-02T12:00:00".into()),
        pub_key: Some("pk-base64".into()),
        priv_key_id: Some("pkid-1".into()),
        extra: Map::new(),
    }
}
