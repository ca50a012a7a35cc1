use async_trait::async_trait;

use faultline_provider::ProviderError;

/// A rendered email ready for transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plain-text body.
    pub text_body: String,
    /// HTML body, sent as the alternative part when present.
    pub html_body: Option<String>,
}

/// Transport acknowledgement.
#[derive(Debug, Clone)]
pub struct EmailResult {
    pub message_id: Option<String>,
    pub status: String,
}

/// Unified email transport interface.
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Send one message.
    async fn send(&self, message: &EmailMessage) -> Result<EmailResult, ProviderError>;

    /// Verify the transport is operational.
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Short name for logs.
    fn backend_name(&self) -> &'static str;
}
