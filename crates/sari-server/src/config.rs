//! Server configuration, read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:7993";

/// Largest accepted media upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Users returned by a directory search.
pub const SEARCH_LIMIT: usize = 20;

/// Users returned by the public directory.
pub const PUBLIC_USERS_LIMIT: usize = 50;

/// Posts returned by the feed.
pub const FEED_LIMIT: usize = 50;

/// Outbound mail API. When absent, mail is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// URL to POST each message to.
    pub webhook_url: String,
    /// Optional bearer token for the mail API.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// HMAC key for session tokens.
    pub session_secret: Vec<u8>,
    /// Allowed CORS origin and base for links in emails.
    pub frontend_url: String,
    /// Whether the session cookie carries `Secure`.
    pub cookie_secure: bool,
    pub mail: Option<MailConfig>,
    pub mail_from: String,
}

impl Config {
    /// Build the configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Result<Self, String> {
        let addr = env_or("SARI_ADDR", DEFAULT_ADDR)
            .parse()
            .map_err(|e| format!("SARI_ADDR: {e}"))?;

        let session_secret = match std::env::var("SESSION_SECRET").or_else(|_| std::env::var("JWT_SECRET")) {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                warn!("SESSION_SECRET not set; using a random key, sessions end on restart");
                random_secret()
            }
        };

        let mail = std::env::var("MAIL_WEBHOOK_URL").ok().map(|url| MailConfig {
            webhook_url: url,
            token: std::env::var("MAIL_WEBHOOK_TOKEN").ok(),
        });
        info!("{}", mail_mode(mail.as_ref()));

        Ok(Self {
            addr,
            db_path: PathBuf::from(env_or("SARI_DB_PATH", "data/sari.db")),
            upload_dir: PathBuf::from(env_or("SARI_UPLOAD_DIR", "data/uploads")),
            session_secret,
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            cookie_secure: matches!(
                std::env::var("COOKIE_SECURE").as_deref(),
                Ok("1") | Ok("true") | Ok("yes")
            ),
            mail,
            mail_from: env_or("MAIL_FROM", "SARI <no-reply@sari.local>"),
        })
    }

    /// A configuration for tests: ephemeral upload dir, fixed secret,
    /// log-only mail.
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            addr: ([127, 0, 0, 1], 0).into(),
            db_path: PathBuf::from(":memory:"),
            upload_dir,
            session_secret: b"test-session-secret-0123456789ab".to_vec(),
            frontend_url: "http://localhost:3000".to_string(),
            cookie_secure: false,
            mail: None,
            mail_from: "SARI <no-reply@sari.local>".to_string(),
        }
    }
}

/// Startup line describing where outbound mail goes.
fn mail_mode(mail: Option<&MailConfig>) -> String {
    match mail {
        Some(m) => format!("Mail webhook configured: {}", m.webhook_url),
        None => "MAIL_WEBHOOK_URL not set; outbound mail is only logged".to_string(),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn random_secret() -> Vec<u8> {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    bytes.to_vec()
}
