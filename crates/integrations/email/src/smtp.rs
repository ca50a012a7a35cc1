use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use faultline_provider::ProviderError;

use crate::backend::{EmailBackend, EmailMessage, EmailResult};
use crate::config::SmtpConfig;

/// SMTP email delivery backend using `lettre`.
pub struct SmtpBackend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpBackend")
            .field("transport", &"<AsyncSmtpTransport>")
            .finish()
    }
}

impl SmtpBackend {
    /// Create a new backend from the given SMTP configuration.
    pub fn new(config: &SmtpConfig) -> Result<Self, ProviderError> {
        let transport = build_transport(config)?;
        Ok(Self { transport })
    }

    /// Create a backend with a pre-built transport (for testing).
    pub fn with_transport(transport: AsyncSmtpTransport<Tokio1Executor>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl EmailBackend for SmtpBackend {
    async fn send(&self, message: &EmailMessage) -> Result<EmailResult, ProviderError> {
        debug!(to = %message.to, subject = %message.subject, "building SMTP message");
        let lettre_message = build_message(message)?;

        self.transport.send(lettre_message).await.map_err(|e| {
            error!(error = %e, "SMTP send failed");
            ProviderError::Connection(format!("SMTP send failed: {e}"))
        })?;

        info!(to = %message.to, "email sent via SMTP");
        Ok(EmailResult {
            message_id: None,
            status: "sent".to_owned(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.transport.test_connection().await.map_err(|e| {
            error!(error = %e, "SMTP health check failed");
            ProviderError::Connection(format!("SMTP health check failed: {e}"))
        })?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "smtp"
    }
}

/// Build a `lettre::Message` from the unified [`EmailMessage`].
fn build_message(msg: &EmailMessage) -> Result<Message, ProviderError> {
    let from_mailbox: Mailbox = msg
        .from
        .parse()
        .map_err(|e| ProviderError::Configuration(format!("invalid from address: {e}")))?;

    let to_mailbox: Mailbox = msg
        .to
        .parse()
        .map_err(|e| ProviderError::DeliveryFailed(format!("invalid recipient address: {e}")))?;

    let builder = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(&msg.subject);

    let message = match &msg.html_body {
        Some(html) => builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_PLAIN)
                            .body(msg.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            )
            .map_err(|e| ProviderError::DeliveryFailed(format!("failed to build email: {e}")))?,
        None => builder
            .body(msg.text_body.clone())
            .map_err(|e| ProviderError::DeliveryFailed(format!("failed to build email: {e}")))?,
    };

    Ok(message)
}

/// Build an async SMTP transport from the given configuration.
fn build_transport(
    config: &SmtpConfig,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        .map_err(|e| ProviderError::Configuration(format!("invalid SMTP host: {e}")))?
        .port(config.port);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(html: bool) -> EmailMessage {
        EmailMessage {
            from: "Faultline <alerts@faultline.test>".into(),
            to: "dev@example.test".into(),
            subject: "[production] API errors".into(),
            text_body: "Detected 3 occurrences".into(),
            html_body: html.then(|| "<h1>Detected 3 occurrences</h1>".to_owned()),
        }
    }

    #[test]
    fn builds_multipart_when_html_present() {
        let built = build_message(&message(true)).unwrap();
        let rendered = String::from_utf8(built.formatted()).unwrap();
        assert!(rendered.contains("multipart/alternative"));
        assert!(rendered.contains("text/html"));
    }

    #[test]
    fn builds_plain_text_otherwise() {
        let built = build_message(&message(false)).unwrap();
        let rendered = String::from_utf8(built.formatted()).unwrap();
        assert!(!rendered.contains("multipart/alternative"));
        assert!(rendered.contains("Detected 3 occurrences"));
    }

    #[test]
    fn invalid_recipient_is_a_delivery_error() {
        let mut msg = message(false);
        msg.to = "not-an-address".into();
        let err = build_message(&msg).unwrap_err();
        assert!(matches!(err, ProviderError::DeliveryFailed(_)));
    }
}
