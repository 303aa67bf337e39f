//! Outbound email transport.
//!
//! The service only ever logs outgoing mail (`LogMailer`); real delivery lives outside this
//! process. Tests use `FakeMailer` to capture messages.

use async_trait::async_trait;
use tracing::info;

/// A rendered message ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, msg: EmailMessage) -> anyhow::Result<()>;
}

pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, msg: EmailMessage) -> anyhow::Result<()> {
        // Bodies carry single-use tokens, so only the envelope is logged.
        info!(
            from = %self.from,
            to = %msg.to,
            subject = %msg.subject,
            bytes = msg.html.len(),
            "email dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
pub use fake::FakeMailer;


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_messages() {
        let mailer = LogMailer::new("noreply@rooffax.test");
        let msg = EmailMessage {
            to: "alice@example.com".into(),
            subject: "Hi".into(),
            html: "<p>Hi</p>".into(),
        };
        assert!(mailer.send(msg).await.is_ok());
    }

    #[tokio::test]
    async fn fake_mailer_records_and_fails_on_demand() {
        let ok = FakeMailer::new();
        ok.send(EmailMessage {
            to: "a@example.com".into(),
            subject: "s".into(),
            html: "h".into(),
        })
        .await
        .unwrap();
        assert_eq!(ok.sent_messages().len(), 1);
        assert_eq!(ok.last_message().unwrap().to, "a@example.com");

        let broken = FakeMailer::failing();
        let res = broken
            .send(EmailMessage {
                to: "b@example.com".into(),
                subject: "s".into(),
                html: "h".into(),
            })
            .await;
        assert!(res.is_err());
        assert!(broken.sent_messages().is_empty());
    }
}
