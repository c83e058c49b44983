//! One-time codes: email verification OTPs and password-reset tokens.
//!
//! - OTP: six decimal digits, valid for [`OTP_TTL_MS`].
//! - Reset token: 32 random bytes as hex, handed to the user once.
//!   Only `hash_token(token)` is persisted.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// OTP lifetime (10 minutes).
pub const OTP_TTL_MS: u64 = 10 * 60 * 1000;

/// Password-reset token lifetime (1 hour).
pub const RESET_TTL_MS: u64 = 60 * 60 * 1000;

/// Generate a six-digit numeric OTP.
pub fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(100_000..=999_999);
    code.to_string()
}

/// Check a submitted OTP against the stored one.
///
/// The code is compared before the expiry so a wrong guess never learns
/// whether the stored code is still live.
pub fn otp_matches(stored: &str, given: &str, expires_at: u64, now: u64) -> Result<()> {
    if stored != given.trim() {
        return Err(Error::InvalidOtp);
    }
    if now > expires_at {
        return Err(Error::OtpExpired);
    }
    Ok(())
}

/// Generate a fresh password-reset token (64 hex chars).
pub fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// SHA-256 of a reset token, hex encoded. This is what storage keeps.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
