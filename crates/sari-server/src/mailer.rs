//! Outbound email: verification codes and password-reset links.
//!
//! Delivery goes through an HTTP mail API (a JSON POST per message). Without
//! one configured, messages are written to the log so local development
//! still works.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, MailConfig};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail API returned {0}")]
    Status(reqwest::StatusCode),
}

/// One outgoing message, as posted to the mail API.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub enum Mailer {
    Webhook {
        config: MailConfig,
        from: String,
        client: reqwest::Client,
    },
    LogOnly {
        from: String,
    },
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        match &config.mail {
            Some(mail) => Mailer::Webhook {
                config: mail.clone(),
                from: config.mail_from.clone(),
                client: reqwest::Client::new(),
            },
            None => Mailer::LogOnly {
                from: config.mail_from.clone(),
            },
        }
    }

    fn from_address(&self) -> &str {
        match self {
            Mailer::Webhook { from, .. } | Mailer::LogOnly { from } => from,
        }
    }

    /// Send the signup verification code.
    pub async fn send_otp(&self, to: &str, otp: &str) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: self.from_address().to_string(),
            to: to.to_string(),
            subject: "SARI - Email Verification OTP".to_string(),
            html: otp_html(otp),
        };
        self.deliver(mail).await
    }

    /// Send a password-reset link.
    pub async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: self.from_address().to_string(),
            to: to.to_string(),
            subject: "SARI - Password Reset".to_string(),
            html: reset_html(link),
        };
        self.deliver(mail).await
    }

    async fn deliver(&self, mail: OutgoingMail) -> Result<(), MailError> {
        match self {
            Mailer::LogOnly { .. } => {
                info!("Mail (not sent, no webhook): to={} subject={:?}", mail.to, mail.subject);
                Ok(())
            }
            Mailer::Webhook { config, client, .. } => {
                let mut req = client.post(&config.webhook_url).json(&mail);
                if let Some(ref t) = config.token {
                    req = req.header("Authorization", format!("Bearer {t}"));
                }
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    warn!("Mail webhook returned {}", resp.status());
                    return Err(MailError::Status(resp.status()));
                }
                Ok(())
            }
        }
    }
}

fn otp_html(otp: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="text-align: center;">SARI Email Verification</h2>
  <p>Your verification code is:</p>
  <h1 style="text-align: center; letter-spacing: 10px;">{otp}</h1>
  <p style="text-align: center;">This code will expire in 10 minutes.</p>
</div>"#
    )
}

fn reset_html(link: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="text-align: center;">SARI Password Reset</h2>
  <p>Click the link below to reset your password:</p>
  <p style="text-align: center;"><a href="{link}">Reset Password</a></p>
  <p>This link will expire in 1 hour.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_carry_code_and_link() {
        assert!(otp_html("482913").contains("482913"));
        let html = reset_html("http://localhost:3000/reset-password/abc");
        assert!(html.contains("href=\"http://localhost:3000/reset-password/abc\""));
    }

    #[tokio::test]
    async fn log_only_mailer_succeeds() {
        let mailer = Mailer::LogOnly { from: "SARI <x@y>".into() };
        assert!(mailer.send_otp("a@example.com", "123456").await.is_ok());
    }
}
