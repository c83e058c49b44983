//! Posts, the feed, likes and comments.

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::str::FromStr;

use sari_core::model::Visibility;
use sari_core::validate;

use super::views::{CommentView, PostView, UserSummary};
use super::{JsonBody, post_views};
use crate::config::FEED_LIMIT;
use crate::error::{ApiError, ApiResult};
use crate::media::{Folder, Upload};
use crate::session::CurrentUser;
use crate::state::{AppState, SharedState};
use crate::storage::PostRecord;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/create", post(create_post))
        .route("/feed", get(feed))
        .route("/{post_id}/like", put(toggle_like))
        .route("/{post_id}/comment", post(add_comment))
        .route("/user/{user_id}", get(user_posts))
}

fn post_view(state: &AppState, post: &PostRecord) -> ApiResult<PostView> {
    post_views(state, std::slice::from_ref(post))?
        .pop()
        .ok_or_else(|| ApiError::Internal("post view missing".into()))
}

fn existing_post(state: &AppState, post_id: &str) -> ApiResult<PostRecord> {
    state
        .db
        .get_post(post_id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

/// POST /posts/create (multipart: `caption`, `visibility`, optional `image`)
async fn create_post(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<PostView>> {
    let mut caption = String::new();
    let mut visibility = Visibility::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => image = Some(Upload::read(field).await?),
            "caption" => caption = validate::caption(&field.text().await?)?,
            "visibility" => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    visibility = Visibility::from_str(value.trim())?;
                }
            }
            _ => {}
        }
    }

    let image_url = match image {
        Some(upload) => match state.media.save(Folder::Posts, &upload).await? {
            Some((filename, url)) => {
                state.db.record_upload(&user.id, Folder::Posts.as_str(), &filename)?;
                url
            }
            None => String::new(),
        },
        None => String::new(),
    };

    if caption.trim().is_empty() && image_url.is_empty() {
        return Err(ApiError::bad_request("Post needs a caption or an image"));
    }

    let post = state.db.create_post(&user.id, &caption, &image_url, visibility)?;
    Ok(Json(post_view(&state, &post)?))
}

/// GET /posts/feed
async fn feed(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<PostView>>> {
    let posts = state.db.feed_posts(&user.id, FEED_LIMIT)?;
    Ok(Json(post_views(&state, &posts)?))
}

/// PUT /posts/{post_id}/like: like, or unlike if already liked.
async fn toggle_like(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> ApiResult<Json<PostView>> {
    let post = existing_post(&state, &post_id)?;
    state.db.toggle_like(&post.id, &user.id)?;
    Ok(Json(post_view(&state, &post)?))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

/// POST /posts/{post_id}/comment
async fn add_comment(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    JsonBody(req): JsonBody<CommentRequest>,
) -> ApiResult<Json<CommentView>> {
    let post = existing_post(&state, &post_id)?;
    let text = validate::comment(&req.text)?;
    let comment = state.db.add_comment(&post.id, &user.id, &text)?;
    Ok(Json(CommentView::new(&comment, UserSummary::from(&user))))
}

/// GET /posts/user/{user_id}
///
/// Friends-only posts are included for the author and accepted friends.
async fn user_posts(
    State(state): State<SharedState>,
    CurrentUser(viewer): CurrentUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<PostView>>> {
    let author = state
        .db
        .get_user(&user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let include_friends_only = author.id == viewer.id || state.db.are_friends(&viewer.id, &author.id)?;
    let posts = state.db.posts_by_user(&author.id, include_friends_only)?;
    Ok(Json(post_views(&state, &posts)?))
}
