use std::sync::Arc;

use async_trait::async_trait;

use faultline_core::ChannelKind;
use faultline_provider::{ChannelProvider, NotificationContext, ProviderError, ProviderResponse};

use crate::pipeline::EmailPipeline;

/// Adapter registering the email pipeline as a dispatch channel.
///
/// The dispatcher hands over one channel target per call; the pipeline
/// applies preference routing (immediate, digest, disabled) per resolved
/// recipient.
pub struct EmailChannel {
    pipeline: Arc<EmailPipeline>,
}

impl EmailChannel {
    /// Wrap a pipeline.
    pub fn new(pipeline: Arc<EmailPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl ChannelProvider for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn notify(
        &self,
        context: &NotificationContext,
        target: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let report = self
            .pipeline
            .deliver(
                &context.project,
                &context.rule,
                &context.alert,
                &[target.to_owned()],
            )
            .await;

        if report.all_failed() {
            let detail = report
                .failed
                .iter()
                .map(|(recipient, error)| format!("{recipient}: {error}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProviderError::DeliveryFailed(detail));
        }

        Ok(ProviderResponse::success(serde_json::json!({
            "sent": report.sent.len(),
            "queued": report.queued.len(),
            "dropped": report.dropped.len(),
        })))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.pipeline.backend().health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailerConfig;
    use chrono::Utc;
    use faultline_core::{
        AlertPayload, AlertRule, ChannelTarget, EmailMode, Project, RuleKind, Severity, TeamMember,
    };
    use faultline_email::StubBackend;
    use faultline_storage::{MemoryDigestQueue, MemoryMemberStore};

    fn context() -> NotificationContext {
        NotificationContext::new(
            Project::new("p1", "Checkout", "k", "s"),
            AlertRule {
                id: "r1".into(),
                project_id: "p1".into(),
                name: "rule".into(),
                kind: RuleKind::NewError,
                environments: Vec::new(),
                filter: None,
                channels: vec![ChannelTarget::new(ChannelKind::Email, "a@x.test")],
                cooldown_minutes: None,
                enabled: true,
                escalation: None,
            },
            AlertPayload::new("t", "s", Severity::High, "prod".into(), Utc::now()),
        )
    }

    #[tokio::test]
    async fn queued_delivery_counts_as_success() {
        let backend = Arc::new(StubBackend::new());
        let members = Arc::new(MemoryMemberStore::new());
        members.upsert(TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest));
        let pipeline = Arc::new(EmailPipeline::new(
            backend.clone(),
            members,
            Arc::new(MemoryDigestQueue::new()),
            MailerConfig::new("alerts@faultline.test"),
        ));
        let channel = EmailChannel::new(pipeline);

        let response = channel.notify(&context(), "a@x.test").await.unwrap();
        assert_eq!(response.body["queued"], 1);
        assert!(backend.sent().is_empty());
    }
}
