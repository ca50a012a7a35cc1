use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use faultline_provider::ProviderError;

use crate::backend::{EmailBackend, EmailMessage, EmailResult};

/// Fallback transport used when no SMTP configuration is present.
///
/// Logs the message and acknowledges acceptance so a missing transport
/// never fails ingestion. Sent messages are retained for inspection in
/// tests.
#[derive(Debug, Default)]
pub struct StubBackend {
    sent: Mutex<Vec<EmailMessage>>,
}

impl StubBackend {
    /// Create a new stub backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("stub mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailBackend for StubBackend {
    async fn send(&self, message: &EmailMessage) -> Result<EmailResult, ProviderError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email transport not configured; logging instead of sending"
        );
        self.sent
            .lock()
            .expect("stub mutex poisoned")
            .push(message.clone());
        Ok(EmailResult {
            message_id: None,
            status: "accepted".to_owned(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "stub"
    }
}
