use faultline_provider::ProviderError;
use thiserror::Error;

/// Errors specific to the Slack channel.
#[derive(Debug, Error)]
pub enum SlackError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Slack webhook rejected the message.
    #[error("Slack API error: {0}")]
    Api(String),

    /// The endpoint returned HTTP 429.
    #[error("rate limited by Slack")]
    RateLimited,
}

impl From<SlackError> for ProviderError {
    fn from(err: SlackError) -> Self {
        match err {
            SlackError::Http(e) => {
                if e.is_timeout() {
                    ProviderError::Timeout(std::time::Duration::from_secs(0))
                } else {
                    ProviderError::Connection(e.to_string())
                }
            }
            SlackError::Api(msg) => ProviderError::DeliveryFailed(msg),
            SlackError::RateLimited => ProviderError::RateLimited,
        }
    }
}
