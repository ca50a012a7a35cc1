use faultline_provider::ProviderError;
use thiserror::Error;

/// Errors specific to the Discord channel.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook rejected the message.
    #[error("Discord API error: {0}")]
    Api(String),

    /// The endpoint returned HTTP 429.
    #[error("rate limited by Discord")]
    RateLimited,
}

impl From<DiscordError> for ProviderError {
    fn from(err: DiscordError) -> Self {
        match err {
            DiscordError::Http(e) => {
                if e.is_timeout() {
                    ProviderError::Timeout(std::time::Duration::from_secs(0))
                } else {
                    ProviderError::Connection(e.to_string())
                }
            }
            DiscordError::Api(msg) => ProviderError::DeliveryFailed(msg),
            DiscordError::RateLimited => ProviderError::RateLimited,
        }
    }
}
