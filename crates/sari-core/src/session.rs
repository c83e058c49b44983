//! Signed session tokens.
//!
//! Token format: `base64url(user_id|expires_ms|hex(hmac_sha256(user_id|expires_ms)))`.
//! The server keeps no session table; the HMAC key is the only secret.
//!
//! Issuing:
//! 1. Build the payload `user_id|expires_ms`
//! 2. MAC it with the server secret
//! 3. Append the hex MAC and base64url-encode the whole string
//!
//! Verification reverses the steps and checks the MAC in constant time
//! before looking at the expiry.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default session lifetime (7 days).
pub const SESSION_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

fn mac_for(secret: &[u8], payload: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::MalformedToken)?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Issue a token for `user_id` that expires `ttl_ms` after `now_ms`.
pub fn issue(user_id: &str, secret: &[u8], now_ms: u64, ttl_ms: u64) -> Result<String> {
    if user_id.is_empty() || user_id.contains('|') {
        return Err(Error::invalid("user_id", "must be non-empty and contain no '|'"));
    }
    let payload = format!("{}|{}", user_id, now_ms.saturating_add(ttl_ms));
    let signature = mac_for(secret, &payload)?.finalize().into_bytes();
    let token = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(token.as_bytes()))
}

/// Verify a token and return the user id it was issued for.
pub fn verify(token: &str, secret: &[u8], now_ms: u64) -> Result<String> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token.trim().as_bytes())
        .map_err(|_| Error::MalformedToken)?;
    let text = String::from_utf8(decoded).map_err(|_| Error::MalformedToken)?;

    let mut parts = text.rsplitn(2, '|');
    let (Some(sig_hex), Some(payload)) = (parts.next(), parts.next()) else {
        return Err(Error::MalformedToken);
    };
    let (user_id, expires) = payload.split_once('|').ok_or(Error::MalformedToken)?;
    let expires: u64 = expires.parse().map_err(|_| Error::MalformedToken)?;
    let signature = hex::decode(sig_hex).map_err(|_| Error::MalformedToken)?;

    mac_for(secret, payload)?
        .verify_slice(&signature)
        .map_err(|_| Error::BadTokenSignature)?;

    if now_ms > expires {
        return Err(Error::TokenExpired);
    }
    Ok(user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-with-enough-entropy!";

    #[test]
    fn issue_and_verify() {
        let token = issue("user-1", SECRET, 1_000, SESSION_TTL_MS).unwrap();
        assert_eq!(verify(&token, SECRET, 2_000).unwrap(), "user-1");
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue("user-1", SECRET, 1_000, 10).unwrap();
        assert_eq!(verify(&token, SECRET, 1_011), Err(Error::TokenExpired));
        assert!(verify(&token, SECRET, 1_010).is_ok());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue("user-1", SECRET, 0, SESSION_TTL_MS).unwrap();
        assert_eq!(verify(&token, b"another-secret", 1), Err(Error::BadTokenSignature));
    }

    #[test]
    fn tampered_user_id_rejected() {
        let token = issue("user-1", SECRET, 0, SESSION_TTL_MS).unwrap();
        let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(raw.replacen("user-1", "user-2", 1));
        assert_eq!(verify(&forged, SECRET, 1), Err(Error::BadTokenSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(verify("!!!", SECRET, 0), Err(Error::MalformedToken));
        let no_sig = URL_SAFE_NO_PAD.encode("user-1");
        assert_eq!(verify(&no_sig, SECRET, 0), Err(Error::MalformedToken));
    }
}
