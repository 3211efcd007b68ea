//! Outbound email as an injected capability: handlers only see `Mailer`.

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, error};

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// One delivery attempt, no retries.
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Production transport: SMTPS relay with credentials from the environment.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.server)
            .context("smtp relay")?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        let from = cfg
            .username
            .parse()
            .with_context(|| format!("sender address {:?}", cfg.username))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().with_context(|| format!("recipient {to:?}"))?)
            .subject(subject)
            .body(body.to_string())
            .context("build message")?;
        if let Err(e) = self.transport.send(message).await {
            error!(error = %e, to = %to, "smtp send failed");
            return Err(e).context("smtp send");
        }
        debug!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// Mail captured by [`RecordingMailer`].
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Test double that records instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Digits of the most recent body, i.e. the last confirmation code.
    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|m| m.body.chars().filter(char::is_ascii_digit).collect())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(OutgoingEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_mailer_captures_and_extracts_code() {
        let mailer = RecordingMailer::default();
        mailer
            .send("a@x.com", "assunto", "Olá alice, seu código de confirmação é: 042913")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(mailer.last_code().as_deref(), Some("042913"));
    }
}
