use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use faultline_core::ChannelKind;
use faultline_provider::{ChannelProvider, NotificationContext, ProviderError, ProviderResponse};

use crate::error::TeamsError;
use crate::types::{TeamsFact, TeamsMessageCard, TeamsOpenUriAction, TeamsSection};

/// Teams channel that posts a `MessageCard` to a webhook URL.
pub struct TeamsChannel {
    client: Client,
}

impl TeamsChannel {
    /// Create a new channel with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Create a channel with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Render the notification snapshot into a card.
    #[must_use]
    pub fn build_card(context: &NotificationContext) -> TeamsMessageCard {
        let alert = &context.alert;

        let mut card = TeamsMessageCard::new(alert.title.clone())
            .with_title(alert.title.clone())
            .with_section(TeamsSection {
                activity_title: Some(format!(
                    "{} / {}",
                    context.project.name, context.rule.name
                )),
                text: Some(alert.summary.clone()),
                facts: vec![
                    TeamsFact::new("Severity", alert.severity.to_string()),
                    TeamsFact::new("Environment", alert.environment.labels().join(", ")),
                    TeamsFact::new("Occurrences", alert.occurrences.to_string()),
                    TeamsFact::new("Affected users", alert.affected_users.to_string()),
                ],
            });

        if let Some(why) = &alert.context.why_it_matters {
            card = card.with_section(TeamsSection {
                activity_title: Some("Why this matters".into()),
                text: Some(why.clone()),
                facts: Vec::new(),
            });
        }

        if !alert.context.next_steps.is_empty() {
            card = card.with_section(TeamsSection {
                activity_title: Some("Next steps".into()),
                text: Some(alert.context.next_steps.join("\n\n")),
                facts: Vec::new(),
            });
        }

        if let Some(dashboard) = &alert.links.dashboard {
            card = card.with_action(TeamsOpenUriAction::new("View Error", dashboard));
        }

        card
    }

    async fn post(&self, url: &str, card: &TeamsMessageCard) -> Result<(), TeamsError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(card)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Teams webhook rate limit hit");
            return Err(TeamsError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TeamsError::Api(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for TeamsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Teams
    }

    #[instrument(skip(self, context), fields(alert_id = ?context.alert.id, rule_id = %context.rule.id))]
    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let card = Self::build_card(context);
        debug!("posting MessageCard to Teams");
        self.post(target, &card).await?;
        Ok(ProviderResponse::success(serde_json::json!({"ok": true})))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use faultline_core::{AlertLinks, AlertPayload, AlertRule, Project, RuleKind, Severity};

    use super::*;

    #[test]
    fn card_includes_facts_and_view_action() {
        let mut alert = AlertPayload::new(
            "Critical alert",
            "Critical alert triggered for fingerprint abc.",
            Severity::Critical,
            "production".into(),
            Utc::now(),
        );
        alert.links = AlertLinks {
            dashboard: Some("https://dash/e/9".into()),
            acknowledge: None,
            unsubscribe: None,
        };

        let context = NotificationContext::new(
            Project::new("p1", "Checkout", "k", "s"),
            AlertRule {
                id: "r1".into(),
                project_id: "p1".into(),
                name: "Critical".into(),
                kind: RuleKind::Critical {
                    severity: Some(Severity::Critical),
                    fingerprints: Vec::new(),
                },
                environments: Vec::new(),
                filter: None,
                channels: Vec::new(),
                cooldown_minutes: None,
                enabled: true,
                escalation: None,
            },
            alert,
        );

        let card = TeamsChannel::build_card(&context);
        assert_eq!(card.sections[0].facts[0].value, "critical");
        assert_eq!(card.potential_action[0].name, "View Error");
        assert_eq!(card.potential_action[0].targets[0].uri, "https://dash/e/9");
    }
}
