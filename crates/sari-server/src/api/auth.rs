//! Account lifecycle: signup with an emailed OTP, login, logout and
//! password reset.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sari_core::codes::{self, OTP_TTL_MS, RESET_TTL_MS};
use sari_core::model::OnlineStatus;
use sari_core::{password, validate};

use super::views::{LoginUser, SignupUser};
use super::{JsonBody, message};
use crate::error::{ApiError, ApiResult};
use crate::relay::ServerEvent;
use crate::session::{clear_cookie, issue_token, optional_user, session_cookie};
use crate::state::SharedState;
use crate::storage::now_millis;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/verify-otp", post(verify_otp))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/{token}", post(reset_password))
}

/// Argon2 runs on the blocking pool.
pub async fn hash_password(plain: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash(&plain))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task: {e}")))?
        .map_err(ApiError::from)
}

pub async fn verify_password(plain: String, stored: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || password::verify(&plain, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: &'static str,
    pub user_id: String,
}

/// POST /auth/signup
async fn signup(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    let name = validate::name(&req.name)?;
    let email = validate::normalize_email(&req.email)?;
    validate::password(&req.password)?;

    if state
        .db
        .get_user_by_email(&email)?
        .is_some_and(|u| u.email_verified)
    {
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = hash_password(req.password).await?;
    let otp = codes::generate_otp();
    let user_id = state
        .db
        .upsert_pending_signup(&name, &email, &password_hash, &otp, now_millis() + OTP_TTL_MS)?
        .ok_or_else(|| ApiError::bad_request("User already exists"))?;

    state
        .mailer
        .send_otp(&email, &otp)
        .await
        .map_err(|e| ApiError::Internal(format!("sending OTP: {e}")))?;

    info!("Signup pending verification: {user_id}");
    Ok(Json(SignupResponse {
        message: "OTP sent to your email",
        user_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse<U> {
    pub message: &'static str,
    pub user: U,
    /// Same value as the cookie; lets non-browser clients authenticate the
    /// realtime socket.
    pub token: String,
}

/// POST /auth/verify-otp
async fn verify_otp(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::bad_request("Invalid request");
    if req.user_id.is_empty() || req.otp.trim().is_empty() {
        return Err(invalid());
    }

    let user = state.db.get_user(&req.user_id)?.ok_or_else(invalid)?;
    let (Some(stored), Some(expires_at)) = (user.otp_code.as_deref(), user.otp_expires_at) else {
        return Err(invalid());
    };
    codes::otp_matches(stored, &req.otp, expires_at, now_millis())?;

    state.db.mark_verified(&user.id)?;
    let token = issue_token(&state, &user.id)?;
    info!("Email verified: {}", user.id);

    Ok((
        [(SET_COOKIE, session_cookie(&token, state.config.cookie_secure))],
        Json(AuthResponse {
            message: "Account created successfully",
            user: SignupUser::from(&user),
            token,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /auth/login
async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    let invalid = || ApiError::bad_request("Invalid credentials");
    let email = validate::normalize_email(&req.email).map_err(|_| invalid())?;

    let user = state.db.get_user_by_email(&email)?.ok_or_else(invalid)?;
    if !user.email_verified {
        return Err(ApiError::bad_request("Please verify your email first"));
    }
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    state.db.set_online_status(&user.id, OnlineStatus::Online)?;
    let token = issue_token(&state, &user.id)?;
    info!("Login: {}", user.id);

    Ok((
        [(SET_COOKIE, session_cookie(&token, state.config.cookie_secure))],
        Json(AuthResponse {
            message: "Login successful",
            user: LoginUser::from(&user),
            token,
        }),
    ))
}

/// POST /auth/logout
async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    if let Some(user) = optional_user(&state, &headers) {
        // Presence stays with the socket while one is still open.
        if !state.hub.is_online(&user.id) {
            state.db.set_online_status(&user.id, OnlineStatus::Offline)?;
            state.hub.broadcast(ServerEvent::UserStatus {
                user_id: user.id.clone(),
                status: OnlineStatus::Offline,
            });
        }
        info!("Logout: {}", user.id);
    }
    Ok(([(SET_COOKIE, clear_cookie())], message("Logged out successfully")))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /auth/forgot-password
async fn forgot_password(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = validate::normalize_email(&req.email)?;
    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::bad_request("User not found"))?;

    let token = codes::generate_reset_token();
    state
        .db
        .set_reset_token(&user.id, &codes::hash_token(&token), now_millis() + RESET_TTL_MS)?;

    let link = format!("{}/reset-password/{token}", state.config.frontend_url);
    if let Err(e) = state.mailer.send_password_reset(&user.email, &link).await {
        warn!("Password reset mail to {} failed: {e}", user.id);
        return Err(ApiError::Internal(format!("sending reset link: {e}")));
    }
    Ok(message("Password reset email sent"))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
}

/// POST /auth/reset-password/{token}
async fn reset_password(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    validate::password(&req.password)?;
    let user = state
        .db
        .find_by_reset_token(&codes::hash_token(&token), now_millis())?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired token"))?;

    let password_hash = hash_password(req.password).await?;
    state.db.set_password(&user.id, &password_hash)?;
    info!("Password reset: {}", user.id);
    Ok(message("Password reset successful"))
}
