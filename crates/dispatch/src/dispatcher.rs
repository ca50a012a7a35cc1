use serde::Serialize;
use tracing::{debug, instrument, warn};

use faultline_core::{ChannelKind, ChannelTarget};
use faultline_provider::{ChannelRegistry, NotificationContext, ProviderError, ProviderResponse};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};

/// Captured error for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchFailure {
    /// Machine-readable error kind (`circuit_open`, `timeout`, ...).
    pub kind: String,
    pub message: String,
}

impl From<&ProviderError> for DispatchFailure {
    fn from(err: &ProviderError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

/// Result of delivering to one channel.
#[derive(Debug)]
pub struct ChannelDispatchResult {
    pub kind: ChannelKind,
    pub target: String,
    pub outcome: Result<ProviderResponse, DispatchFailure>,
}

/// The per-channel outcome list returned to the caller. Partial failure is
/// not an error; the summary always covers every configured channel.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub results: Vec<ChannelDispatchResult>,
}

impl DispatchSummary {
    /// Number of successful deliveries.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// True when a non-empty channel list produced zero deliveries.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.delivered() == 0
    }
}

/// Dispatches one alert to every channel of a rule, sequentially and in
/// configuration order, collecting per-channel results.
pub struct ChannelDispatcher {
    registry: ChannelRegistry,
    slack_breaker: CircuitBreaker,
}

impl std::fmt::Debug for ChannelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ChannelDispatcher {
    /// Create a dispatcher with the default Slack breaker settings.
    #[must_use]
    pub fn new(registry: ChannelRegistry) -> Self {
        Self::with_breaker(registry, CircuitBreakerConfig::default())
    }

    /// Create a dispatcher with custom Slack breaker settings.
    #[must_use]
    pub fn with_breaker(registry: ChannelRegistry, breaker: CircuitBreakerConfig) -> Self {
        Self {
            registry,
            slack_breaker: CircuitBreaker::new(breaker),
        }
    }

    /// The Slack circuit breaker (exposed for observability).
    #[must_use]
    pub fn slack_breaker(&self) -> &CircuitBreaker {
        &self.slack_breaker
    }

    /// Deliver the notification to each channel in order.
    #[instrument(skip(self, context, channels), fields(rule_id = %context.rule.id, alert_id = ?context.alert.id))]
    pub async fn dispatch(
        &self,
        context: &NotificationContext,
        channels: &[ChannelTarget],
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for channel in channels {
            let outcome = self.dispatch_one(context, channel).await;
            if let Err(failure) = &outcome {
                warn!(
                    channel = %channel.kind,
                    target = %channel.target,
                    error_kind = %failure.kind,
                    error = %failure.message,
                    "channel delivery failed"
                );
            } else {
                debug!(channel = %channel.kind, target = %channel.target, "channel delivered");
            }
            summary.results.push(ChannelDispatchResult {
                kind: channel.kind,
                target: channel.target.clone(),
                outcome,
            });
        }

        summary
    }

    async fn dispatch_one(
        &self,
        context: &NotificationContext,
        channel: &ChannelTarget,
    ) -> Result<ProviderResponse, DispatchFailure> {
        let Some(provider) = self.registry.get(channel.kind) else {
            let err = ProviderError::NotRegistered(channel.kind.to_string());
            return Err(DispatchFailure::from(&err));
        };

        if channel.kind == ChannelKind::Slack {
            if let Err(open) = self.slack_breaker.try_acquire() {
                return Err(DispatchFailure::from(&open));
            }
            let result = provider.notify(context, &channel.target).await;
            match result {
                Ok(response) => {
                    self.slack_breaker.record_success();
                    Ok(response)
                }
                Err(err) => {
                    self.slack_breaker.record_failure();
                    Err(DispatchFailure::from(&err))
                }
            }
        } else {
            provider
                .notify(context, &channel.target)
                .await
                .map_err(|err| DispatchFailure::from(&err))
        }
    }
}
