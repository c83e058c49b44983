//! Friend directory, requests and the friend list.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use sari_core::model::FriendshipStatus;

use super::views::{DirectoryEntry, FriendEntry, FriendshipView, PendingRequests, UserSummary};
use super::{JsonBody, message, summaries, summary_of};
use crate::config::{PUBLIC_USERS_LIMIT, SEARCH_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::relay::ServerEvent;
use crate::session::CurrentUser;
use crate::state::{AppState, SharedState};
use crate::storage::{FriendshipRecord, UserRecord};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/search", get(search))
        .route("/public", get(public_users))
        .route("/request", post(send_request))
        .route("/accept/{request_id}", put(accept_request))
        .route("/reject/{request_id}", put(reject_request))
        .route("/requests", get(pending_requests))
        .route("/list", get(friend_list))
}

/// Attach the viewer's relation to each user.
fn directory(state: &AppState, viewer_id: &str, users: &[UserRecord]) -> ApiResult<Vec<DirectoryEntry>> {
    let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
    let relations = state.db.relations_for(viewer_id, &ids)?;
    Ok(users
        .iter()
        .map(|u| DirectoryEntry::new(u, relations.get(&u.id).copied().unwrap_or_default()))
        .collect())
}

/// Expand both sides of each record.
fn friendship_views(state: &AppState, records: &[FriendshipRecord]) -> ApiResult<Vec<FriendshipView>> {
    let users = summaries(
        state,
        records
            .iter()
            .flat_map(|f| [f.requester_id.as_str(), f.recipient_id.as_str()]),
    )?;
    Ok(records
        .iter()
        .map(|f| {
            FriendshipView::new(
                f,
                summary_of(&users, &f.requester_id),
                summary_of(&users, &f.recipient_id),
            )
        })
        .collect())
}

fn friendship_view(state: &AppState, record: &FriendshipRecord) -> ApiResult<FriendshipView> {
    friendship_views(state, std::slice::from_ref(record))?
        .pop()
        .ok_or_else(|| ApiError::Internal("friendship view missing".into()))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// GET /friends/search?query=
async fn search(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Vec<DirectoryEntry>>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let users = state.db.search_users(&user.id, query, SEARCH_LIMIT)?;
    Ok(Json(directory(&state, &user.id, &users)?))
}

/// GET /friends/public
async fn public_users(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<DirectoryEntry>>> {
    let users = state.db.public_users(&user.id, PUBLIC_USERS_LIMIT)?;
    Ok(Json(directory(&state, &user.id, &users)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    #[serde(default)]
    pub recipient_id: String,
}

/// POST /friends/request
async fn send_request(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<FriendRequestBody>,
) -> ApiResult<Json<FriendshipView>> {
    if req.recipient_id.is_empty() {
        return Err(ApiError::bad_request("Recipient is required"));
    }
    if req.recipient_id == user.id {
        return Err(ApiError::bad_request("Cannot send friend request to yourself"));
    }
    let recipient = state
        .db
        .get_user(&req.recipient_id)?
        .filter(|u| u.email_verified)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let record = state
        .db
        .create_friend_request(&user.id, &recipient.id)?
        .ok_or_else(|| ApiError::bad_request("Friend request already exists"))?;

    let view = FriendshipView::new(&record, UserSummary::from(&user), UserSummary::from(&recipient));
    state.hub.emit_to_user(
        &recipient.id,
        ServerEvent::FriendRequest {
            request: serde_json::to_value(&view).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    );
    info!("Friend request {} from {} to {}", record.id, user.id, recipient.id);
    Ok(Json(view))
}

/// Load a pending request addressed to `user`.
fn request_for_recipient(state: &AppState, request_id: &str, user: &UserRecord) -> ApiResult<FriendshipRecord> {
    let record = state
        .db
        .get_friendship(request_id)?
        .ok_or_else(|| ApiError::not_found("Request not found"))?;
    if record.recipient_id != user.id {
        return Err(ApiError::forbidden());
    }
    if record.status != FriendshipStatus::Pending {
        return Err(ApiError::bad_request("Request already handled"));
    }
    Ok(record)
}

/// PUT /friends/accept/{request_id}
async fn accept_request(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(request_id): Path<String>,
) -> ApiResult<Json<FriendshipView>> {
    let record = request_for_recipient(&state, &request_id, &user)?;
    let record = state
        .db
        .set_friendship_status(&record.id, FriendshipStatus::Accepted)?
        .ok_or_else(|| ApiError::not_found("Request not found"))?;

    let view = friendship_view(&state, &record)?;
    state.hub.emit_to_user(
        &record.requester_id,
        ServerEvent::FriendAccepted {
            request: serde_json::to_value(&view).map_err(|e| ApiError::Internal(e.to_string()))?,
        },
    );
    info!("Friend request {} accepted", record.id);
    Ok(Json(view))
}

/// PUT /friends/reject/{request_id}
///
/// The record is removed, so the requester may ask again later.
async fn reject_request(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(request_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = request_for_recipient(&state, &request_id, &user)?;
    state.db.delete_friendship(&record.id)?;
    Ok(message("Request rejected"))
}

/// GET /friends/requests
async fn pending_requests(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<PendingRequests>> {
    let sent = state.db.pending_sent(&user.id)?;
    let received = state.db.pending_received(&user.id)?;
    Ok(Json(PendingRequests {
        sent: friendship_views(&state, &sent)?,
        received: friendship_views(&state, &received)?,
    }))
}

/// GET /friends/list
async fn friend_list(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<FriendEntry>>> {
    let records = state.db.accepted_friendships(&user.id)?;
    let ids: Vec<&str> = records.iter().map(|f| f.other(&user.id)).collect();
    let users = state.db.users_by_ids(&ids)?;

    Ok(Json(
        records
            .iter()
            .filter_map(|f| {
                let friend = users.get(f.other(&user.id))?;
                Some(FriendEntry {
                    user: UserSummary::from(friend),
                    bio: friend.bio.clone(),
                    friendship_id: f.id.clone(),
                })
            })
            .collect(),
    ))
}
