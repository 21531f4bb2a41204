//! Chat route handlers: REST inbox and history, and the live WebSocket.
//!
//! Messages are persisted before they are broadcast, whichever transport
//! they arrive on, so a client that reconnects can rebuild the conversation
//! from `GET /api/v1/chats/{id}`.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::instrument;

use vide_grenier_core::{ChatId, MessageId, ProductId, UserId};

use crate::error::{ApiJson, Result};
use crate::middleware::RequireAuth;
use crate::middleware::auth::authenticate;
use crate::models::{Chat, ChatSummary, Message};
use crate::services::ChatService;
use crate::services::chat::{ChatError, ClientFrame, OutgoingMessage, Presence, ServerFrame};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenChatRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: Chat,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub message_ids: Vec<MessageId>,
}

/// `?token=` on the WebSocket URL; browsers cannot set headers there.
#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: String,
}

fn chats(state: &AppState) -> ChatService<'_> {
    ChatService::new(state.pool(), state.notifier())
}

pub async fn inbox(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatSummary>>> {
    Ok(Json(chats(&state).inbox(user.id).await?))
}

/// Open (or reopen) a chat with the seller of a product.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn open(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OpenChatRequest>,
) -> Result<(StatusCode, Json<Chat>)> {
    let chat = chats(&state).open(body.product_id, user.id).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn unread(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<UnreadResponse>> {
    Ok(Json(UnreadResponse {
        unread: chats(&state).unread_total(user.id).await?,
    }))
}

pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ChatId>,
) -> Result<Json<ChatDetail>> {
    let service = chats(&state);
    let chat = service.get_for(id, user.id).await?;
    let messages = service.history(&chat).await?;
    Ok(Json(ChatDetail { chat, messages }))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn send_message(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ChatId>,
    ApiJson(body): ApiJson<OutgoingMessage>,
) -> Result<(StatusCode, Json<Message>)> {
    let service = chats(&state);
    let chat = service.get_for(id, user.id).await?;
    let message = service.send(&chat, user.id, &body).await?;
    state
        .chat_hub()
        .publish(chat.id, ServerFrame::Message {
            message: message.clone(),
        })
        .await;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<ChatId>,
) -> Result<Json<ReadResponse>> {
    let service = chats(&state);
    let chat = service.get_for(id, user.id).await?;
    let message_ids = service.mark_read(&chat, user.id).await?;
    if !message_ids.is_empty() {
        state
            .chat_hub()
            .publish(chat.id, ServerFrame::ReadReceipt {
                user_id: user.id,
                message_ids: message_ids.clone(),
            })
            .await;
    }
    Ok(Json(ReadResponse { message_ids }))
}

/// Upgrade to a chat WebSocket. Only the chat's buyer and seller may join.
#[instrument(skip(ws, state, query))]
pub async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<SocketQuery>,
) -> Result<Response> {
    let user = authenticate(state.jwt(), &query.token)?;
    let chat = chats(&state).get_for(chat_id, user.id).await?;
    tracing::debug!(user_id = %user.id, "Chat socket accepted");
    Ok(ws.on_upgrade(move |socket| run_socket(socket, state, chat, user.id)))
}

type Sink = SplitSink<WebSocket, WsMessage>;

async fn run_socket(socket: WebSocket, state: AppState, chat: Chat, user: UserId) {
    let (mut sink, mut stream) = socket.split();
    let hub = state.chat_hub();
    let mut room = hub.subscribe(chat.id).await;
    hub.publish(chat.id, ServerFrame::UserStatus {
        user_id: user,
        status: Presence::Joined,
    })
    .await;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(reply) = handle_frame(&state, &chat, user, text.as_str()).await
                        && send_frame(&mut sink, &reply).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            frame = room.recv() => match frame {
                Ok(frame) => {
                    if send_frame(&mut sink, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(chat_id = %chat.id, skipped, "Chat socket lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(room);
    hub.publish(chat.id, ServerFrame::UserStatus {
        user_id: user,
        status: Presence::Left,
    })
    .await;
    hub.release(chat.id).await;
    tracing::debug!(chat_id = %chat.id, user_id = %user, "Chat socket closed");
}

/// Apply one client frame. Returns a frame for the sender alone (errors);
/// everything else is broadcast to the room.
async fn handle_frame(
    state: &AppState,
    chat: &Chat,
    user: UserId,
    text: &str,
) -> Option<ServerFrame> {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return Some(frame_error("unrecognized frame"));
    };
    let service = chats(state);
    let hub = state.chat_hub();

    match frame {
        ClientFrame::Message(outgoing) => match service.send(chat, user, &outgoing).await {
            Ok(message) => {
                hub.publish(chat.id, ServerFrame::Message { message }).await;
                None
            }
            Err(ChatError::Repository(e)) => {
                tracing::error!(error = %e, chat_id = %chat.id, "Failed to store chat message");
                Some(frame_error("message could not be sent"))
            }
            Err(e) => Some(frame_error(&e.to_string())),
        },
        ClientFrame::Typing { is_typing } => {
            hub.publish(chat.id, ServerFrame::Typing {
                user_id: user,
                is_typing,
            })
            .await;
            None
        }
        ClientFrame::ReadReceipt => match service.mark_read(chat, user).await {
            Ok(message_ids) if message_ids.is_empty() => None,
            Ok(message_ids) => {
                hub.publish(chat.id, ServerFrame::ReadReceipt {
                    user_id: user,
                    message_ids,
                })
                .await;
                None
            }
            Err(e) => {
                tracing::error!(error = %e, chat_id = %chat.id, "Failed to mark messages read");
                Some(frame_error("read receipt failed"))
            }
        },
    }
}

fn frame_error(error: &str) -> ServerFrame {
    ServerFrame::Error {
        error: error.to_owned(),
    }
}

async fn send_frame(sink: &mut Sink, frame: &ServerFrame) -> std::result::Result<(), axum::Error> {
    let Ok(text) = serde_json::to_string(frame) else {
        return Ok(());
    };
    sink.send(WsMessage::Text(text.into())).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_frame_shape() {
        let json = serde_json::to_value(frame_error("unrecognized frame")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "error", "error": "unrecognized frame" })
        );
    }

    #[test]
    fn test_socket_query_requires_token() {
        assert!(serde_json::from_value::<SocketQuery>(serde_json::json!({})).is_err());
    }
}
