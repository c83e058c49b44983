//! Profiles: the caller's own account and other users' public pages.

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::str::FromStr;

use sari_core::model::{AccountMode, Relation};
use sari_core::validate;

use super::auth::{hash_password, verify_password};
use super::views::{PrivateProfile, PublicProfile};
use super::{JsonBody, message};
use crate::error::{ApiError, ApiResult};
use crate::media::{Folder, Upload};
use crate::session::CurrentUser;
use crate::state::SharedState;
use crate::storage::ProfileUpdate;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route("/change-password", put(change_password))
        .route("/{id}", get(profile))
}

/// GET /user/me
async fn me(CurrentUser(user): CurrentUser) -> Json<PrivateProfile> {
    Json(PrivateProfile::from(&user))
}

/// PUT /user/profile (multipart)
///
/// Text fields: `name`, `bio`, `accountMode`, `primaryColor`,
/// `secondaryColor`, `tertiaryColor`. File field: `profilePicture`.
/// Absent or blank fields are left unchanged, except `bio` which may be
/// cleared.
async fn update_profile(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<PrivateProfile>> {
    let mut update = ProfileUpdate::default();
    let (mut primary, mut secondary, mut tertiary) = (None, None, None);
    let mut picture = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "profilePicture" {
            picture = Some(Upload::read(field).await?);
            continue;
        }
        let value = field.text().await?;
        let blank = value.trim().is_empty();
        match name.as_str() {
            "name" if !blank => update.name = Some(validate::name(&value)?),
            "bio" => update.bio = Some(validate::bio(&value)?),
            "accountMode" if !blank => {
                update.account_mode = Some(AccountMode::from_str(value.trim())?)
            }
            "primaryColor" if !blank => primary = Some(validate::theme_color("primaryColor", &value)?),
            "secondaryColor" if !blank => {
                secondary = Some(validate::theme_color("secondaryColor", &value)?)
            }
            "tertiaryColor" if !blank => {
                tertiary = Some(validate::theme_color("tertiaryColor", &value)?)
            }
            _ => {}
        }
    }

    if primary.is_some() || secondary.is_some() || tertiary.is_some() {
        update.theme = Some(user.theme.merged(primary, secondary, tertiary));
    }

    if let Some(upload) = picture {
        if let Some((filename, url)) = state.media.save(Folder::Profiles, &upload).await? {
            state.db.record_upload(&user.id, Folder::Profiles.as_str(), &filename)?;
            update.profile_picture = Some(url);
        }
    }

    let updated = state
        .db
        .update_profile(&user.id, &update)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(PrivateProfile::from(&updated)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// PUT /user/change-password
async fn change_password(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.current_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::bad_request("Current and new password are required"));
    }
    validate::password(&req.new_password)?;
    if !verify_password(req.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(req.new_password).await?;
    state.db.set_password(&user.id, &password_hash)?;
    Ok(message("Password changed successfully"))
}

/// GET /user/{id}
async fn profile(
    State(state): State<SharedState>,
    CurrentUser(viewer): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<PublicProfile>> {
    let user = state
        .db
        .get_user(&id)?
        .filter(|u| u.email_verified)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let relation = if user.id == viewer.id {
        Relation::None
    } else {
        state
            .db
            .relations_for(&viewer.id, &[user.id.as_str()])?
            .remove(&user.id)
            .unwrap_or_default()
    };
    Ok(Json(PublicProfile::new(&user, relation)))
}
