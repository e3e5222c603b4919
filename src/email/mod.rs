use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::EmailConfig,
    error::{AppError, Result},
};

pub mod messages;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/pdf".to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| AppError::Internal(format!("Invalid SMTP relay: {}", e)))?;

        let mut builder = builder.port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: OutgoingEmail) -> Result<Message> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient {}: {}", email.to, e)))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject);

        if let Some(bcc) = email.bcc.as_deref().and_then(|b| b.parse::<Mailbox>().ok()) {
            builder = builder.bcc(bcc);
        }

        let message = match email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| AppError::Internal(format!("Invalid content type: {}", e)))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(email.body))
                        .singlepart(
                            MimeAttachment::new(attachment.filename)
                                .body(attachment.content, content_type),
                        ),
                )
            }
            None => builder.header(ContentType::TEXT_PLAIN).body(email.body),
        };

        message.map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let to = email.to.clone();
        let subject = email.subject.clone();
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP error: {}", e)))?;

        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured: logs the message and drops it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            attachment = email.attachment.as_ref().map(|a| a.filename.as_str()),
            "Email disabled, not sending"
        );
        tracing::debug!("{}", email.body);
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingMailer;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{Mailer, OutgoingEmail};
    use crate::error::{AppError, Result};

    /// Keeps every message in memory so tests can inspect them.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: Mutex<bool>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        pub fn set_failing(&self, fail: bool) {
            if let Ok(mut flag) = self.fail.lock() {
                *flag = fail;
            }
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> Result<()> {
            if self.fail.lock().map(|f| *f).unwrap_or(false) {
                return Err(AppError::External("SMTP error: connection refused".to_string()));
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(email);
            }
            Ok(())
        }
    }
}
