use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use faultline_core::ChannelKind;
use faultline_provider::{ChannelProvider, NotificationContext, ProviderError, ProviderResponse};

use crate::config::SlackConfig;
use crate::error::SlackError;
use crate::types::{SlackBlock, SlackButton, SlackMessage, SlackText};

/// Slack channel that posts Block Kit messages to an incoming webhook.
pub struct SlackChannel {
    client: Client,
}

impl SlackChannel {
    /// Create a new channel with the given configuration.
    pub fn new(config: SlackConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Create a channel with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Render the notification snapshot into a Block Kit message.
    #[must_use]
    pub fn build_message(context: &NotificationContext) -> SlackMessage {
        let alert = &context.alert;
        let mut blocks = vec![
            SlackBlock::section(format!("*{}*\n{}", alert.title, alert.summary)),
            SlackBlock::Context {
                elements: vec![SlackText::mrkdwn(format!(
                    "Project: *{}* | Rule: *{}*",
                    context.project.name, context.rule.name
                ))],
            },
            SlackBlock::fields(vec![
                SlackText::mrkdwn(format!("*Severity:* {}", alert.severity)),
                SlackText::mrkdwn(format!(
                    "*Environment:* {}",
                    alert.environment.labels().join(", ")
                )),
                SlackText::mrkdwn(format!("*Occurrences:* {}", alert.occurrences)),
                SlackText::mrkdwn(format!("*Affected users:* {}", alert.affected_users)),
            ]),
        ];

        if let Some(why) = &alert.context.why_it_matters {
            blocks.push(SlackBlock::section(format!(
                "*Why this matters*\n{why}"
            )));
        }

        if !alert.context.recent_deployments.is_empty() {
            let lines: Vec<String> = alert
                .context
                .recent_deployments
                .iter()
                .map(|d| format!("• {} at {}", d.version, d.deployed_at.to_rfc3339()))
                .collect();
            blocks.push(SlackBlock::section(format!(
                "*Recent deployments*\n{}",
                lines.join("\n")
            )));
        }

        if !alert.context.similar_incidents.is_empty() {
            let lines: Vec<String> = alert
                .context
                .similar_incidents
                .iter()
                .map(|i| format!("• {} ({} occurrences)", i.message, i.count))
                .collect();
            blocks.push(SlackBlock::section(format!(
                "*Similar incidents*\n{}",
                lines.join("\n")
            )));
        }

        if !alert.context.next_steps.is_empty() {
            let lines: Vec<String> = alert
                .context
                .next_steps
                .iter()
                .enumerate()
                .map(|(i, step)| format!("{}. {step}", i + 1))
                .collect();
            blocks.push(SlackBlock::section(format!(
                "*Next steps*\n{}",
                lines.join("\n")
            )));
        }

        let mut actions = Vec::new();
        if let Some(dashboard) = &alert.links.dashboard {
            actions.push(SlackButton::link("View Error", dashboard).primary());
        }
        if let Some(acknowledge) = &alert.links.acknowledge {
            actions.push(SlackButton::link("Acknowledge", acknowledge));
        }
        if !actions.is_empty() {
            blocks.push(SlackBlock::Actions { elements: actions });
        }

        SlackMessage {
            text: alert.title.clone(),
            blocks,
        }
    }

    async fn post(&self, url: &str, message: &SlackMessage) -> Result<(), SlackError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Slack webhook rate limit hit");
            return Err(SlackError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    #[instrument(skip(self, context), fields(alert_id = ?context.alert.id, rule_id = %context.rule.id))]
    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let message = Self::build_message(context);
        debug!(blocks = message.blocks.len(), "posting message to Slack");
        self.post(target, &message).await?;
        Ok(ProviderResponse::success(serde_json::json!({"ok": true})))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        // Incoming webhooks have no probe endpoint; targets are per-rule.
        Ok(())
    }
}
