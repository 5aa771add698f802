use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn otp(to: &str, otp: &str, ttl_secs: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your verification code".into(),
            body: format!("Your verification code is {otp}. It expires in {} minutes.", ttl_secs / 60),
        }
    }

    pub fn password_reset(to: &str, token: &str, ttl_secs: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your password".into(),
            body: format!("Use this token to reset your password: {token}. It expires in {} minutes.", ttl_secs / 60),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// Records outgoing mail in the log instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogMailer {
    pub sender: String,
}

impl Default for LogMailer {
    fn default() -> Self { Self { sender: "noreply@shopfront.local".into() } }
}

#[async_trait]
impl Mailer for LogMailer {
    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: Email) -> Result<()> {
        info!(from = %self.sender, body = %email.body, "email dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_email() {
        let email = Email::otp("a@example.com", "123456", 300);
        assert_eq!(email.to, "a@example.com");
        assert!(email.body.contains("123456"));
        assert!(email.body.contains("5 minutes"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        assert!(LogMailer::default().send(Email::password_reset("a@example.com", "tok", 900)).await.is_ok());
    }
}
