//! Transport-free event handlers.
//!
//! Every inbound event is handled here against `AppState` alone, so the
//! whole protocol is testable without a live WebSocket. The actor in
//! `routes::wsroute` only parses frames, dispatches into these functions,
//! and forwards the outcome.

use crate::error::{AppError, AppResult};
use crate::services::{reclamation, ChatroomService, MessageService};
use crate::session::ConnectionId;
use crate::state::AppState;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::RoomId;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Complete the post-authentication half of the handshake: register the
/// session, open the connection's outbound channel, join the personal room,
/// and confirm with `joinedUserRoom`.
pub async fn handshake(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
) -> UnboundedReceiver<String> {
    let rx = state.registry.register_connection(conn).await;
    state.sessions.register(conn, user_id).await;

    let personal = RoomId::User(user_id);
    state.registry.join(personal, conn).await;
    state
        .registry
        .broadcast(
            personal,
            WsOutboundEvent::JoinedUserRoom { room_id: user_id }.to_wire(),
        )
        .await;

    tracing::info!(%conn, %user_id, "session registered");
    rx
}

/// Tear down a connection: abandon in-flight state, leave every room.
/// Committed store writes are untouched.
pub async fn disconnect(state: &AppState, conn: ConnectionId) {
    let rooms = state.sessions.remove(conn).await;
    state.registry.remove_connection(conn, &rooms).await;
    tracing::info!(%conn, rooms = rooms.len(), "session removed");
}

/// Dispatch one inbound event. Errors are returned to the caller, which
/// reports them to the requesting connection only.
pub async fn handle_event(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
    event: WsInboundEvent,
) -> AppResult<()> {
    match event {
        WsInboundEvent::JoinRoom { chatroom_id } => {
            join_room(state, conn, user_id, chatroom_id).await
        }
        WsInboundEvent::LeaveRoom { chatroom_id } => {
            leave_room(state, conn, user_id, chatroom_id).await
        }
        WsInboundEvent::ChatroomMessage {
            chatroom_id,
            message,
        } => MessageService::send(state, user_id, chatroom_id, message)
            .await
            .map(|_| ()),
        WsInboundEvent::ReadMessages { message_ids } => {
            let ids = message_ids.ok_or(AppError::MissingParameter("messageIds"))?;
            match reclamation::acknowledge(
                state.store.as_ref(),
                &state.config.reclamation,
                user_id,
                &ids,
            )
            .await?
            {
                reclamation::ReclamationOutcome::Acknowledged {
                    acknowledged,
                    deleted,
                } => {
                    tracing::info!(
                        %user_id,
                        acknowledged = acknowledged.len(),
                        reclaimed = deleted.len(),
                        "read acknowledgment applied"
                    );
                }
                reclamation::ReclamationOutcome::NothingToAcknowledge => {
                    tracing::debug!(%user_id, "nothing to acknowledge");
                }
            }
            Ok(())
        }
    }
}

/// Join the chatroom's transport room after the membership authority has
/// approved it, then announce the join to the room.
pub async fn join_room(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
    chatroom_id: Option<Uuid>,
) -> AppResult<()> {
    let chatroom_id = chatroom_id.ok_or(AppError::MissingParameter("chatroomId"))?;
    ChatroomService::require_member(state.store.as_ref(), chatroom_id, user_id).await?;

    let room = RoomId::Chatroom(chatroom_id);
    state.sessions.join_room(conn, room).await;
    state.registry.join(room, conn).await;
    state
        .registry
        .broadcast(
            room,
            WsOutboundEvent::Notification {
                message: format!("User {user_id} joined the room."),
            }
            .to_wire(),
        )
        .await;
    Ok(())
}

/// Leaving is always safe: no membership check, the connection is removed
/// from the room unconditionally and the departure is announced.
pub async fn leave_room(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
    chatroom_id: Option<Uuid>,
) -> AppResult<()> {
    let chatroom_id = chatroom_id.ok_or(AppError::MissingParameter("chatroomId"))?;

    let room = RoomId::Chatroom(chatroom_id);
    state.sessions.leave_room(conn, room).await;
    state.registry.leave(room, conn).await;
    state
        .registry
        .broadcast(
            room,
            WsOutboundEvent::Notification {
                message: format!("User {user_id} left the room."),
            }
            .to_wire(),
        )
        .await;
    Ok(())
}
