use serde::{Deserialize, Serialize};

/// Whether the endpoint accepted the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Response from a channel after delivering a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub status: ResponseStatus,
    /// Channel-specific response body (HTTP status, message ids, ...).
    pub body: serde_json::Value,
}

impl ProviderResponse {
    /// Create a successful response.
    #[must_use]
    pub fn success(body: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            body,
        }
    }

    /// Create a failure response.
    #[must_use]
    pub fn failure(body: serde_json::Value) -> Self {
        Self {
            status: ResponseStatus::Failure,
            body,
        }
    }

    /// Whether the delivery succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
