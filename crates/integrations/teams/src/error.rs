use faultline_provider::ProviderError;
use thiserror::Error;

/// Errors specific to the Teams channel.
#[derive(Debug, Error)]
pub enum TeamsError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook rejected the card.
    #[error("Teams API error: {0}")]
    Api(String),

    /// The endpoint returned HTTP 429.
    #[error("rate limited by Teams")]
    RateLimited,
}

impl From<TeamsError> for ProviderError {
    fn from(err: TeamsError) -> Self {
        match err {
            TeamsError::Http(e) => {
                if e.is_timeout() {
                    ProviderError::Timeout(std::time::Duration::from_secs(0))
                } else {
                    ProviderError::Connection(e.to_string())
                }
            }
            TeamsError::Api(msg) => ProviderError::DeliveryFailed(msg),
            TeamsError::RateLimited => ProviderError::RateLimited,
        }
    }
}
