//! Error types for sari-core.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid field value: {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("OTP expired")]
    OtpExpired,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("malformed session token")]
    MalformedToken,

    #[error("session token signature mismatch")]
    BadTokenSignature,

    #[error("session token expired")]
    TokenExpired,
}

impl Error {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for sari-core operations.
pub type Result<T> = std::result::Result<T, Error>;
