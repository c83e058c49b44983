//! Two-person chats: creation, listing, history, sending and read receipts.

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::str::FromStr;

use sari_core::model::MessageKind;

use super::views::{ChatListEntry, ChatView, MessageView, UserSummary, read_flags};
use super::{JsonBody, message, summaries, summary_of};
use crate::error::{ApiError, ApiResult};
use crate::media::{Folder, Upload};
use crate::session::CurrentUser;
use crate::state::{AppState, SharedState};
use crate::storage::{ChatRecord, UserRecord};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/get-or-create", post(get_or_create))
        .route("/list", get(list_chats))
        .route("/{chat_id}/messages", get(chat_messages))
        .route("/{chat_id}/message", post(send_message))
        .route("/{chat_id}/message/{message_id}/seen", put(mark_seen))
}

/// Load a chat the caller takes part in: 404 if absent, 403 otherwise.
fn participant_chat(state: &AppState, chat_id: &str, user: &UserRecord) -> ApiResult<ChatRecord> {
    let chat = state
        .db
        .get_chat(chat_id)?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.has_participant(&user.id) {
        return Err(ApiError::forbidden());
    }
    Ok(chat)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrCreateRequest {
    #[serde(default)]
    pub friend_id: String,
}

/// POST /chat/get-or-create
async fn get_or_create(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<GetOrCreateRequest>,
) -> ApiResult<Json<ChatView>> {
    if req.friend_id.is_empty() {
        return Err(ApiError::bad_request("Friend is required"));
    }
    if req.friend_id == user.id {
        return Err(ApiError::bad_request("Cannot chat with yourself"));
    }
    let other = state
        .db
        .get_user(&req.friend_id)?
        .filter(|u| u.email_verified)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let (chat, created) = state.db.get_or_create_chat(&user.id, &other.id)?;
    if created {
        tracing::info!("Chat {} created for {} and {}", chat.id, user.id, other.id);
    }

    let users = summaries(&state, chat.participants())?;
    let participants = chat
        .participants()
        .iter()
        .map(|id| summary_of(&users, id))
        .collect();
    Ok(Json(ChatView::new(&chat, participants)))
}

/// GET /chat/list, most recent activity first.
async fn list_chats(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<ChatListEntry>>> {
    let chats = state.db.chats_for_user(&user.id)?;
    let mut last_messages = Vec::with_capacity(chats.len());
    for chat in &chats {
        last_messages.push(state.db.last_message(chat)?);
    }

    let users = summaries(
        &state,
        chats.iter().flat_map(|c| c.participants()),
    )?;

    let entries = chats
        .iter()
        .zip(last_messages)
        .map(|(chat, last)| {
            let (from_me, seen_by_other, unread) =
                read_flags(last.as_ref(), &user.id, chat.other(&user.id));
            ChatListEntry {
                chat: ChatView::new(
                    chat,
                    chat.participants().iter().map(|id| summary_of(&users, id)).collect(),
                ),
                last_message: last
                    .as_ref()
                    .map(|m| MessageView::new(m, summary_of(&users, &m.sender_id))),
                last_message_from_current_user: from_me,
                last_message_seen_by_other: seen_by_other,
                has_unread_for_current_user: unread,
            }
        })
        .collect();
    Ok(Json(entries))
}

/// GET /chat/{chat_id}/messages
async fn chat_messages(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let chat = participant_chat(&state, &chat_id, &user)?;
    let messages = state.db.chat_messages(&chat.id)?;
    let users = summaries(&state, chat.participants())?;
    Ok(Json(
        messages
            .iter()
            .map(|m| MessageView::new(m, summary_of(&users, &m.sender_id)))
            .collect(),
    ))
}

/// POST /chat/{chat_id}/message (multipart: `content`, `type`, optional `media`)
async fn send_message(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(chat_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<MessageView>> {
    let chat = participant_chat(&state, &chat_id, &user)?;

    let mut content = String::new();
    let mut kind = MessageKind::default();
    let mut media = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "media" => media = Some(Upload::read(field).await?),
            "content" => content = field.text().await?,
            "type" => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    kind = MessageKind::from_str(value.trim())?;
                }
            }
            _ => {}
        }
    }

    let media_url = match media {
        Some(upload) => match state.media.save(Folder::Chat, &upload).await? {
            Some((filename, url)) => {
                state.db.record_upload(&user.id, Folder::Chat.as_str(), &filename)?;
                url
            }
            None => String::new(),
        },
        None => String::new(),
    };

    if content.trim().is_empty() && media_url.is_empty() {
        return Err(ApiError::bad_request("Message content or media is required"));
    }

    let msg = state
        .db
        .append_message(&chat.id, &user.id, &content, kind, &media_url)?;
    Ok(Json(MessageView::new(&msg, UserSummary::from(&user))))
}

/// PUT /chat/{chat_id}/message/{message_id}/seen
async fn mark_seen(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let chat = participant_chat(&state, &chat_id, &user)?;
    let msg = state
        .db
        .get_message(&chat.id, &message_id)?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    state.db.mark_seen(&msg.id, &user.id)?;
    Ok(message("Marked as seen"))
}
