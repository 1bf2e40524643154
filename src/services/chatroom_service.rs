//! Chatroom lifecycle and membership authority.
//!
//! A chatroom is identified by its canonical (sorted, deduplicated) member
//! set for creation purposes: creating one with an already-existing exact
//! member set returns the existing chatroom. Deletion cascades to messages
//! and fans out a `chatroomDeleted` notice.

use crate::error::{AppError, AppResult};
use crate::models::{canonical_members, Chatroom};
use crate::state::AppState;
use crate::store::DocumentStore;
use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::RoomId;
use uuid::Uuid;

pub struct ChatroomService;

impl ChatroomService {
    /// Create a chatroom containing `creator` plus `members`. Returns the
    /// existing chatroom when one with the same canonical member set
    /// already exists.
    pub async fn create(
        store: &dyn DocumentStore,
        creator: Uuid,
        members: Vec<Uuid>,
    ) -> AppResult<Chatroom> {
        let canonical = canonical_members(members.into_iter().chain([creator]));

        if let Some(existing) = store.find_chatroom_by_members(&canonical).await? {
            tracing::debug!(chatroom_id = %existing.id, "chatroom with identical member set already exists");
            return Ok(existing);
        }

        let chatroom = store.insert_chatroom(canonical).await?;
        tracing::info!(chatroom_id = %chatroom.id, members = chatroom.members.len(), "chatroom created");
        Ok(chatroom)
    }

    /// Add a user to an existing chatroom. Rejects an already-present
    /// member; the store-level update itself is idempotent.
    pub async fn add_member(
        store: &dyn DocumentStore,
        chatroom_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        store
            .find_chatroom(chatroom_id)
            .await?
            .ok_or(AppError::NotFound("chatroom"))?;

        if !store.add_chatroom_member(chatroom_id, user_id).await? {
            return Err(AppError::AlreadyMember);
        }
        tracing::info!(%chatroom_id, %user_id, "member added to chatroom");
        Ok(())
    }

    /// Fetch a chatroom and require `user_id` to be a member.
    pub async fn require_member(
        store: &dyn DocumentStore,
        chatroom_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Chatroom> {
        let chatroom = store
            .find_chatroom(chatroom_id)
            .await?
            .ok_or(AppError::NotFound("chatroom"))?;
        if !chatroom.has_member(user_id) {
            return Err(AppError::Unauthorized);
        }
        Ok(chatroom)
    }

    /// Delete a chatroom. Cascades to its messages in the store, then
    /// notifies every member's personal room.
    pub async fn delete(state: &AppState, chatroom_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let chatroom = Self::require_member(state.store.as_ref(), chatroom_id, user_id).await?;

        if !state.store.delete_chatroom(chatroom_id).await? {
            return Err(AppError::NotFound("chatroom"));
        }

        // Every member connection sits in its personal room from handshake,
        // so the personal fan-out reaches each connection exactly once.
        let event = WsOutboundEvent::ChatroomDeleted {
            message: chatroom_id.to_string(),
        }
        .to_wire();
        for member in &chatroom.members {
            state
                .registry
                .broadcast(RoomId::User(*member), event.clone())
                .await;
        }

        tracing::info!(%chatroom_id, "chatroom deleted");
        Ok(())
    }

    /// First-message discovery fan-out. For every member other than the
    /// sender, the chatroom's display name is the usernames of all *other*
    /// members (excluding that recipient), joined with ", ".
    pub async fn announce_new_chatroom(
        state: &AppState,
        chatroom: &Chatroom,
        sender: Uuid,
    ) -> AppResult<()> {
        for recipient in chatroom.members.iter().filter(|m| **m != sender) {
            let name = Self::display_name_for(state.store.as_ref(), chatroom, *recipient).await?;
            let event = WsOutboundEvent::NewChatroom {
                id: chatroom.id,
                name,
                members: chatroom.members.clone(),
            };
            state
                .registry
                .broadcast(RoomId::User(*recipient), event.to_wire())
                .await;
        }
        tracing::info!(chatroom_id = %chatroom.id, "new chatroom announced to members");
        Ok(())
    }

    async fn display_name_for(
        store: &dyn DocumentStore,
        chatroom: &Chatroom,
        recipient: Uuid,
    ) -> AppResult<String> {
        let mut names = Vec::new();
        for member in chatroom.members.iter().filter(|m| **m != recipient) {
            // A member without a user record keeps its id as the display
            // fallback.
            let name = match store.find_user(*member).await? {
                Some(user) => user.username,
                None => member.to_string(),
            };
            names.push(name);
        }
        // Member order is uuid order; sort so the displayed name is stable.
        names.sort();
        Ok(names.join(", "))
    }
}
