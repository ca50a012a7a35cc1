use std::time::Duration;

/// Configuration for the Slack channel.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Request timeout. Defaults to seven seconds.
    pub timeout: Duration,
}

impl SlackConfig {
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
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(7),
        }
    }
}
