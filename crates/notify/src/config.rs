use std::time::Duration;

/// Tunables for the notification engine.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// How long alerts accumulate in a bucket before flushing. Zero means
    /// dispatch immediately.
    pub aggregation_window: Duration,
    /// Cooldown applied to rules that do not declare their own.
    pub default_cooldown_minutes: u32,
    /// Escalation delay used when a policy enables escalation without
    /// declaring levels.
    pub default_escalation_minutes: f64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            aggregation_window: Duration::from_secs(300),
            default_cooldown_minutes: 30,
            default_escalation_minutes: 120.0,
        }
    }
}

impl NotifyConfig {
    /// Set the aggregation window.
    #[must_use]
    pub fn with_aggregation_window(mut self, window: Duration) -> Self {
        self.aggregation_window = window;
        self
    }

    /// Set the default cooldown.
    #[must_use]
    pub fn with_default_cooldown_minutes(mut self, minutes: u32) -> Self {
        self.default_cooldown_minutes = minutes;
        self
    }

    /// Set the default escalation delay.
    #[must_use]
    pub fn with_default_escalation_minutes(mut self, minutes: f64) -> Self {
        self.default_escalation_minutes = minutes;
        self
    }
}
