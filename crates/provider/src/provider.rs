use async_trait::async_trait;

use faultline_core::ChannelKind;

use crate::context::NotificationContext;
use crate::error::ProviderError;
use crate::response::ProviderResponse;

/// A delivery channel: renders the notification snapshot into its wire
/// envelope and sends it to the given target.
///
/// Object-safe so the registry can hold `Arc<dyn ChannelProvider>`.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// The channel family this provider serves.
    fn kind(&self) -> ChannelKind;

    /// Deliver one notification to `target` (a webhook URL, an email
    /// address, ...).
    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Verify the channel is operational.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
