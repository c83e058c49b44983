//! Input validation for user-supplied fields.
//!
//! Each check returns the cleaned value on success so handlers can store
//! exactly what was validated.

use crate::error::{Error, Result};

pub const MAX_NAME_CHARS: usize = 60;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_CAPTION_CHARS: usize = 2000;
pub const MAX_BIO_CHARS: usize = 500;
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Trim and lowercase an email address, rejecting obviously broken ones.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(Error::MissingField("email".into()));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::invalid("email", "must contain a single @"));
    };
    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(Error::invalid("email", "is not a valid address"));
    }
    Ok(email)
}

pub fn name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::MissingField("name".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(Error::invalid(
            "name",
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }
    Ok(name.to_string())
}

pub fn password(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::MissingField("password".into()));
    }
    if raw.chars().count() < MIN_PASSWORD_CHARS {
        return Err(Error::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    Ok(())
}

pub fn caption(raw: &str) -> Result<String> {
    max_chars("caption", raw, MAX_CAPTION_CHARS)?;
    Ok(raw.to_string())
}

pub fn bio(raw: &str) -> Result<String> {
    max_chars("bio", raw, MAX_BIO_CHARS)?;
    Ok(raw.to_string())
}

pub fn comment(raw: &str) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::MissingField("text".into()));
    }
    max_chars("text", text, MAX_COMMENT_CHARS)?;
    Ok(text.to_string())
}

/// `#rgb` or `#rrggbb`.
pub fn theme_color(field: &str, raw: &str) -> Result<String> {
    let color = raw.trim();
    let hex = color.strip_prefix('#').unwrap_or("");
    let ok = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
    if !ok {
        return Err(Error::invalid(field, "must be a hex color like #6366f1"));
    }
    Ok(color.to_lowercase())
}

fn max_chars(field: &str, raw: &str, max: usize) -> Result<()> {
    if raw.chars().count() > max {
        return Err(Error::invalid(field, format!("must be at most {max} characters")));
    }
    Ok(())
}
