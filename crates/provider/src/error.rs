use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during channel delivery.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider is registered for the requested channel kind.
    #[error("channel not registered: {0}")]
    NotRegistered(String),

    /// The channel failed to deliver the notification.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The endpoint did not respond within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The channel was given invalid configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The endpoint rejected the request due to rate limiting.
    #[error("rate limited")]
    RateLimited,

    /// The circuit breaker for this endpoint is open.
    #[error("circuit open")]
    CircuitOpen,

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProviderError {
    /// Returns `true` if the error is transient and the delivery may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited | Self::CircuitOpen
        )
    }

    /// Short machine-readable kind tag, recorded in per-channel results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "not_registered",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Configuration(_) => "configuration",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::Serialization(_) => "serialization",
        }
    }
}
