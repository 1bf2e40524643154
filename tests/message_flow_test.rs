mod common;

use chat_relay_service::config::{Config, RetryPolicy};
use chat_relay_service::error::AppError;
use chat_relay_service::models::{Chatroom, Message, User};
use chat_relay_service::services::{ChatroomService, MessageService};
use chat_relay_service::state::AppState;
use chat_relay_service::store::memory::MemoryStore;
use chat_relay_service::store::{DocumentStore, StoreError, StoreTransaction};
use chat_relay_service::websocket::handlers;
use chat_relay_service::websocket::message_types::WsInboundEvent;
use common::{connect, payload, test_state};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Store wrapper whose user lookups always fail, for exercising discovery
/// fan-out failure handling.
struct UserLookupOutage(Arc<MemoryStore>);

#[async_trait::async_trait]
impl DocumentStore for UserLookupOutage {
    async fn find_chatroom(&self, id: Uuid) -> Result<Option<Chatroom>, StoreError> {
        self.0.find_chatroom(id).await
    }

    async fn find_chatroom_by_members(
        &self,
        members: &[Uuid],
    ) -> Result<Option<Chatroom>, StoreError> {
        self.0.find_chatroom_by_members(members).await
    }

    async fn insert_chatroom(&self, members: Vec<Uuid>) -> Result<Chatroom, StoreError> {
        self.0.insert_chatroom(members).await
    }

    async fn add_chatroom_member(&self, id: Uuid, user: Uuid) -> Result<bool, StoreError> {
        self.0.add_chatroom_member(id, user).await
    }

    async fn delete_chatroom(&self, id: Uuid) -> Result<bool, StoreError> {
        self.0.delete_chatroom(id).await
    }

    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        self.0.insert_message(message).await
    }

    async fn find_user(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("user lookup outage".into()))
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.0.insert_user(user).await
    }

    async fn claim_first_message(&self, chatroom: Uuid) -> Result<bool, StoreError> {
        self.0.claim_first_message(chatroom).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.0.begin().await
    }
}

#[tokio::test]
async fn blank_content_is_rejected_and_nothing_persists() {
    let (state, store) = test_state();
    let (a, _conn_a, _rx_a) = connect(&state, "alice").await;
    let (b, _conn_b, _rx_b) = connect(&state, "bob").await;
    let chatroom = ChatroomService::create(state.store.as_ref(), a, vec![b])
        .await
        .unwrap();

    let err = MessageService::send(&state, a, Some(chatroom.id), Some(payload("   ")))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::EmptyContent);
    assert_eq!(store.message_count(), 0);

    // The discovery flag is untouched by a failed send.
    let room = state.store.find_chatroom(chatroom.id).await.unwrap().unwrap();
    assert!(!room.first_message_sent);
}

#[tokio::test]
async fn non_member_cannot_send() {
    let (state, store) = test_state();
    let (a, _conn_a, _rx_a) = connect(&state, "alice").await;
    let (b, _conn_b, _rx_b) = connect(&state, "bob").await;
    let (outsider, _conn_o, _rx_o) = connect(&state, "mallory").await;
    let chatroom = ChatroomService::create(state.store.as_ref(), a, vec![b])
        .await
        .unwrap();

    let err = MessageService::send(&state, outsider, Some(chatroom.id), Some(payload("hi")))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Unauthorized);
    assert_eq!(store.message_count(), 0);

    let err = MessageService::send(&state, a, Some(Uuid::new_v4()), Some(payload("hi")))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::NotFound("chatroom"));
}

#[tokio::test]
async fn message_is_persisted_then_broadcast_verbatim() {
    let (state, store) = test_state();
    let (a, conn_a, mut rx_a) = connect(&state, "alice").await;
    let (b, conn_b, mut rx_b) = connect(&state, "bob").await;
    let chatroom = ChatroomService::create(state.store.as_ref(), a, vec![b])
        .await
        .unwrap();
    handlers::join_room(&state, conn_a, a, Some(chatroom.id)).await.unwrap();
    handlers::join_room(&state, conn_b, b, Some(chatroom.id)).await.unwrap();

    let mut outgoing = payload("hello bob");
    outgoing
        .extra
        .insert("ephemeralKey".into(), serde_json::json!("ek-base64"));

    let message = MessageService::send(&state, a, Some(chatroom.id), Some(outgoing))
        .await
        .unwrap();

    assert_eq!(store.message_count(), 1);
    let stored = store.find_message_sync(message.id).unwrap();
    assert!(stored.read_by.is_empty(), "sender is not auto-acknowledged");

    for rx in [&mut rx_a, &mut rx_b] {
        let event = rx.next_of_type("newMessage");
        assert_eq!(event["_id"], message.id.to_string());
        assert_eq!(event["chatroom"], chatroom.id.to_string());
        assert_eq!(event["sender"], a.to_string());
        assert_eq!(event["message"]["content"], "hello bob");
        assert_eq!(event["message"]["ephemeralKey"], "ek-base64");
    }
}

#[tokio::test]
async fn first_message_announces_chatroom_once() {
    let (state, _store) = test_state();
    let (a, _conn_a, mut rx_a) = connect(&state, "alice").await;
    let (b, _conn_b, mut rx_b) = connect(&state, "bob").await;
    let (c, _conn_c, mut rx_c) = connect(&state, "carol").await;
    let chatroom = ChatroomService::create(state.store.as_ref(), a, vec![b, c])
        .await
        .unwrap();

    MessageService::send(&state, a, Some(chatroom.id), Some(payload("first")))
        .await
        .unwrap();

    // Recipients get the discovery event with a name naming the *other*
    // members; the sender's personal room hears nothing.
    let event = rx_b.next_of_type("newChatroom");
    assert_eq!(event["_id"], chatroom.id.to_string());
    assert_eq!(event["name"], "alice, carol");
    assert_eq!(event["members"].as_array().unwrap().len(), 3);

    let event = rx_c.next_of_type("newChatroom");
    assert_eq!(event["name"], "alice, bob");

    assert!(rx_a.try_next().is_none());

    // Second message: flag already flipped, no second announcement.
    MessageService::send(&state, b, Some(chatroom.id), Some(payload("second")))
        .await
        .unwrap();
    assert!(rx_c.try_next().is_none());

    let room = state.store.find_chatroom(chatroom.id).await.unwrap().unwrap();
    assert!(room.first_message_sent);
}

#[tokio::test]
async fn discovery_outage_does_not_fail_the_send() {
    let base = Arc::new(MemoryStore::new());
    let config = Arc::new(Config {
        port: 0,
        jwt_secret: "test-secret".into(),
        reclamation: RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(1),
        },
    });
    let state = AppState::new(Arc::new(UserLookupOutage(base.clone())), config);
    let (a, _conn_a, _rx_a) = connect(&state, "alice").await;
    let (b, _conn_b, mut rx_b) = connect(&state, "bob").await;
    let chatroom = ChatroomService::create(state.store.as_ref(), a, vec![b])
        .await
        .unwrap();

    // Display-name resolution fails, but the message was already persisted:
    // the send succeeds and no error reaches the sender.
    let msg = MessageService::send(&state, a, Some(chatroom.id), Some(payload("hi")))
        .await
        .unwrap();
    assert!(base.find_message_sync(msg.id).is_some());

    // The flag flipped, and the failed announcement is simply absent.
    let room = base.find_chatroom(chatroom.id).await.unwrap().unwrap();
    assert!(room.first_message_sent);
    assert!(rx_b.try_next().is_none());
}

#[tokio::test]
async fn handle_event_surfaces_validation_errors() {
    let (state, _store) = test_state();
    let (a, conn_a, _rx_a) = connect(&state, "alice").await;

    let err = handlers::handle_event(
        &state,
        conn_a,
        a,
        WsInboundEvent::ChatroomMessage {
            chatroom_id: None,
            message: Some(payload("hi")),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err, AppError::MissingParameter("chatroomId"));

    let err = handlers::handle_event(
        &state,
        conn_a,
        a,
        WsInboundEvent::ReadMessages { message_ids: None },
    )
    .await
    .unwrap_err();
    assert_eq!(err, AppError::MissingParameter("messageIds"));
}
