use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the webhook channel.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Request timeout. Defaults to seven seconds.
    pub timeout: Duration,
    /// Static headers to include in every request.
    pub headers: HashMap<String, String>,
}

impl WebhookConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a static header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(7),
            headers: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_seven_seconds() {
        assert_eq!(WebhookConfig::new().timeout, Duration::from_secs(7));
    }

    #[test]
    fn builder_methods() {
        let config = WebhookConfig::new()
            .with_timeout(Duration::from_millis(500))
            .with_header("X-Source", "faultline");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.headers.get("X-Source").unwrap(), "faultline");
    }
}
