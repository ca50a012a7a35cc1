/// Configuration for the email pipeline.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Sender address for all outgoing mail.
    pub from: String,
    /// Base URL of the dashboard, used for error links.
    pub dashboard_base_url: Option<String>,
    /// Base URL for unsubscribe links; the recipient token is appended as
    /// a query parameter.
    pub unsubscribe_base_url: Option<String>,
}

impl MailerConfig {
    /// Create a configuration with just a sender address.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            dashboard_base_url: None,
            unsubscribe_base_url: None,
        }
    }

    /// Set the dashboard base URL.
    #[must_use]
    pub fn with_dashboard_base_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_base_url = Some(url.into());
        self
    }

    /// Set the unsubscribe base URL.
    #[must_use]
    pub fn with_unsubscribe_base_url(mut self, url: impl Into<String>) -> Self {
        self.unsubscribe_base_url = Some(url.into());
        self
    }
}
