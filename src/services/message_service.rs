//! Message fan-out engine.
//!
//! Validates an inbound payload, persists the message, then broadcasts it
//! to the chatroom's room. Persistence happens-before the broadcast; the
//! broadcast itself is best-effort. The sender is *not* added to the
//! message's read-by set at creation: reclamation completes only once the
//! sender has acknowledged like any other member.

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessagePayload};
use crate::services::ChatroomService;
use crate::state::AppState;
use crate::websocket::message_types::{IncomingPayload, WsOutboundEvent};
use crate::websocket::RoomId;
use chrono::Utc;
use std::collections::BTreeSet;
use uuid::Uuid;

pub struct MessageService;

impl MessageService {
    /// Validation ladder, first failure wins: chatroom id present, payload
    /// present, content non-blank, required key-exchange fields present.
    pub fn validate(
        chatroom_id: Option<Uuid>,
        payload: Option<IncomingPayload>,
    ) -> AppResult<(Uuid, MessagePayload)> {
        let chatroom_id = chatroom_id.ok_or(AppError::MissingParameter("chatroomId"))?;
        let payload = payload.ok_or(AppError::MissingParameter("message"))?;

        let content = payload.content.ok_or(AppError::MissingParameter("content"))?;
        if content.trim().is_empty() {
            return Err(AppError::EmptyContent);
        }

        let pub_key = payload.pub_key.ok_or(AppError::MissingParameter("pubKey"))?;
        let priv_key_id = payload
            .priv_key_id
            .ok_or(AppError::MissingParameter("privKeyId"))?;
        let timestamp = payload
            .timestamp
            .ok_or(AppError::MissingParameter("timestamp"))?;

        Ok((
            chatroom_id,
            MessagePayload {
                content,
                timestamp,
                pub_key,
                priv_key_id,
                extra: payload.extra,
            },
        ))
    }

    /// Persist and fan out a message. Fires the chatroom discovery
    /// notification when this is the chatroom's first message; the
    /// conditional flag flip guarantees a single winner under racing first
    /// sends. Once the message is persisted the send has succeeded;
    /// discovery failures are logged, not surfaced to the sender.
    pub async fn send(
        state: &AppState,
        sender: Uuid,
        chatroom_id: Option<Uuid>,
        payload: Option<IncomingPayload>,
    ) -> AppResult<Message> {
        let (chatroom_id, payload) = Self::validate(chatroom_id, payload)?;
        let chatroom =
            ChatroomService::require_member(state.store.as_ref(), chatroom_id, sender).await?;

        let message = Message {
            id: Uuid::new_v4(),
            chatroom: chatroom_id,
            sender,
            message: payload,
            read_by: BTreeSet::new(),
            created_at: Utc::now(),
        };
        state.store.insert_message(message.clone()).await?;

        state
            .registry
            .broadcast(
                RoomId::Chatroom(chatroom_id),
                WsOutboundEvent::new_message(&message).to_wire(),
            )
            .await;
        tracing::debug!(message_id = %message.id, %chatroom_id, %sender, "message persisted and broadcast");

        match state.store.claim_first_message(chatroom_id).await {
            Ok(true) => {
                if let Err(e) =
                    ChatroomService::announce_new_chatroom(state, &chatroom, sender).await
                {
                    tracing::warn!(%chatroom_id, error = %e, "chatroom discovery fan-out failed");
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(%chatroom_id, error = %e, "first-message flag update failed");
            }
        }

        Ok(message)
    }
}
