//! Request authentication: session cookie / bearer token → current user.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use sari_core::session::{self, SESSION_TTL_MS};

use crate::error::ApiError;
use crate::state::{AppState, SharedState};
use crate::storage::{UserRecord, now_millis};

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "token";

/// The authenticated, email-verified caller.
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or_else(ApiError::unauthenticated)?;
        let user = resolve_token(state, &token)?.ok_or_else(ApiError::unauthenticated)?;
        Ok(CurrentUser(user))
    }
}

/// Verify a token and load its user. `Ok(None)` when the user is gone or
/// not verified; `Err(Unauthorized)` when the token itself is bad.
pub fn resolve_token(state: &AppState, token: &str) -> Result<Option<UserRecord>, ApiError> {
    let user_id = session::verify(token, &state.config.session_secret, now_millis())?;
    Ok(state.db.get_user(&user_id)?.filter(|u| u.email_verified))
}

/// Best-effort lookup for endpoints that work with or without a session.
pub fn optional_user(state: &AppState, headers: &HeaderMap) -> Option<UserRecord> {
    let token = token_from_headers(headers)?;
    resolve_token(state, &token).ok().flatten()
}

/// Pull the session token from `Authorization: Bearer` or the cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        let bearer = bearer.trim();
        if !bearer.is_empty() {
            return Some(bearer.to_string());
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Issue a fresh session token for the user.
pub fn issue_token(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    Ok(session::issue(
        user_id,
        &state.config.session_secret,
        now_millis(),
        SESSION_TTL_MS,
    )?)
}

/// `Set-Cookie` value carrying the session token.
pub fn session_cookie(token: &str, secure: bool) -> HeaderValue {
    let max_age = SESSION_TTL_MS / 1000;
    let mut cookie = format!("{COOKIE_NAME}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| clear_cookie())
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("token=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(COOKIE, HeaderValue::from_static("token=def"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; token=xyz; lang=en"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn empty_cookie_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("token="));
        assert!(token_from_headers(&headers).is_none());
    }

    #[test]
    fn cookie_flags() {
        let cookie = session_cookie("abc", true);
        let text = cookie.to_str().unwrap();
        assert!(text.starts_with("token=abc;"));
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("Max-Age=604800"));
        assert!(text.ends_with("; Secure"));
        assert!(!session_cookie("abc", false).to_str().unwrap().contains("Secure"));
    }
}
