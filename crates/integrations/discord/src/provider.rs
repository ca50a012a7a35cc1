use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use faultline_core::ChannelKind;
use faultline_provider::{ChannelProvider, NotificationContext, ProviderError, ProviderResponse};

use crate::error::DiscordError;
use crate::types::{DiscordEmbed, DiscordEmbedField, DiscordEmbedFooter, DiscordWebhookRequest};

/// Embed color used for alert messages.
const ALERT_COLOR: u32 = 0x00ff_4d4f;

/// Discord channel that posts a single embed to a webhook URL.
pub struct DiscordChannel {
    client: Client,
}

impl DiscordChannel {
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

    /// Render the notification snapshot into the webhook request body.
    #[must_use]
    pub fn build_request(context: &NotificationContext) -> DiscordWebhookRequest {
        let alert = &context.alert;

        let mut fields = vec![
            DiscordEmbedField::inline("Severity", alert.severity.to_string()),
            DiscordEmbedField::inline("Environment", alert.environment.labels().join(", ")),
            DiscordEmbedField::inline("Occurrences", alert.occurrences.to_string()),
            DiscordEmbedField::inline("Affected users", alert.affected_users.to_string()),
        ];

        if let Some(why) = &alert.context.why_it_matters {
            fields.push(DiscordEmbedField::block("Why this matters", why.clone()));
        }
        if !alert.context.next_steps.is_empty() {
            fields.push(DiscordEmbedField::block(
                "Next steps",
                alert.context.next_steps.join("\n"),
            ));
        }

        let embed = DiscordEmbed {
            title: Some(alert.title.clone()),
            description: Some(alert.summary.clone()),
            url: alert.links.dashboard.clone(),
            color: Some(ALERT_COLOR),
            fields: Some(fields),
            footer: Some(DiscordEmbedFooter {
                text: format!("{} \u{2013} {}", context.project.name, context.rule.name),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        };

        DiscordWebhookRequest {
            embeds: vec![embed],
        }
    }

    async fn post(&self, url: &str, request: &DiscordWebhookRequest) -> Result<(), DiscordError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Discord webhook rate limit hit");
            return Err(DiscordError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscordError::Api(format!("HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelProvider for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    #[instrument(skip(self, context), fields(alert_id = ?context.alert.id, rule_id = %context.rule.id))]
    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = Self::build_request(context);
        debug!("posting embed to Discord");
        self.post(target, &request).await?;
        Ok(ProviderResponse::success(serde_json::json!({"ok": true})))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
