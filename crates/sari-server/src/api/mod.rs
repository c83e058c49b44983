//! HTTP API.
//!
//! Endpoints:
//! - /auth     signup with email OTP, login, logout, password reset
//! - /user     own profile, profile edits, other users' profiles
//! - /friends  directory search, requests, friend list
//! - /posts    create, feed, likes, comments
//! - /chat     two-person chats and their messages

pub mod auth;
pub mod chat;
pub mod friends;
pub mod posts;
pub mod users;
pub mod views;

use axum::extract::{FromRequest, Request};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};
use crate::storage::PostRecord;
use views::{CommentView, PostView, UserSummary};

/// All API routes, relative to the server root.
pub fn routes() -> Router<SharedState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/user", users::routes())
        .nest("/friends", friends::routes())
        .nest("/posts", posts::routes())
        .nest("/chat", chat::routes())
}

/// `Json<T>` whose rejection is the API's own `{"error": ...}` shape.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// `{"message": ...}` replies.
pub fn message(text: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": text }))
}

/// Load summaries for a set of user ids in one query.
pub fn summaries<'a>(
    state: &AppState,
    ids: impl IntoIterator<Item = &'a str>,
) -> ApiResult<HashMap<String, UserSummary>> {
    let unique: HashSet<&str> = ids.into_iter().collect();
    let ids: Vec<&str> = unique.into_iter().collect();
    let users = state.db.users_by_ids(&ids)?;
    Ok(users
        .iter()
        .map(|(id, u)| (id.clone(), UserSummary::from(u)))
        .collect())
}

/// Look up a summary, falling back to a placeholder.
pub fn summary_of(map: &HashMap<String, UserSummary>, id: &str) -> UserSummary {
    map.get(id).cloned().unwrap_or_else(|| UserSummary::unknown(id))
}

/// Expand posts with their author, likers and comments.
pub fn post_views(state: &AppState, posts: &[PostRecord]) -> ApiResult<Vec<PostView>> {
    let mut likes = Vec::with_capacity(posts.len());
    let mut comments = Vec::with_capacity(posts.len());
    for post in posts {
        likes.push(state.db.post_likes(&post.id)?);
        comments.push(state.db.post_comments(&post.id)?);
    }

    let ids = posts
        .iter()
        .map(|p| p.user_id.as_str())
        .chain(likes.iter().flatten().map(String::as_str))
        .chain(comments.iter().flatten().map(|c| c.user_id.as_str()));
    let users = summaries(state, ids)?;

    Ok(posts
        .iter()
        .zip(likes)
        .zip(comments)
        .map(|((post, likes), comments)| {
            PostView::new(
                post,
                summary_of(&users, &post.user_id),
                likes.iter().map(|id| summary_of(&users, id)).collect(),
                comments
                    .iter()
                    .map(|c| CommentView::new(c, summary_of(&users, &c.user_id)))
                    .collect(),
            )
        })
        .collect())
}
