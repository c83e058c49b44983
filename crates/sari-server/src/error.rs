//! HTTP error type shared by every handler.
//!
//! Every failure leaves the server as `{"error": "<message>"}` with a
//! matching status code. Internal failures are logged and replaced by the
//! generic `"Server error"` so database details never reach clients.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("Unauthorized".to_string())
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("Not authenticated".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                tracing::error!("Request failed: {detail}");
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Internal(format!("database: {e}"))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(format!("io: {e}"))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid form data: {}", e.body_text()))
    }
}

/// Domain errors: validation and OTP failures are the client's fault,
/// token failures mean "not logged in", hashing failures are ours.
impl From<sari_core::error::Error> for ApiError {
    fn from(e: sari_core::error::Error) -> Self {
        use sari_core::error::Error as Core;
        match e {
            Core::MissingField(_)
            | Core::InvalidField { .. }
            | Core::UnknownVariant { .. }
            | Core::InvalidOtp
            | Core::OtpExpired => ApiError::BadRequest(e.to_string()),
            Core::MalformedToken | Core::BadTokenSignature | Core::TokenExpired => {
                ApiError::unauthenticated()
            }
            Core::PasswordHash(detail) => ApiError::Internal(format!("password hash: {detail}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_hidden() {
        let resp = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn core_errors_map_to_statuses() {
        use sari_core::error::Error as Core;
        assert_eq!(ApiError::from(Core::InvalidOtp).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Core::InvalidOtp).to_string(), "Invalid OTP");
        assert_eq!(ApiError::from(Core::TokenExpired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(Core::PasswordHash("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
