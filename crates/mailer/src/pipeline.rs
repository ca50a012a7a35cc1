use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use faultline_core::{AlertPayload, AlertRule, EmailMode, Project};
use faultline_email::EmailBackend;
use faultline_storage::{DigestEntry, DigestQueueStore, MemberStore};

use crate::config::MailerConfig;
use crate::quiet_hours::quiet_hours_active;
use crate::recipients::resolve_recipients;
use crate::render::{render_alert_email, unsubscribe_url};

/// What happened to each recipient of one alert.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub sent: Vec<String>,
    pub queued: Vec<String>,
    pub dropped: Vec<String>,
    /// `(recipient, error)` pairs for transport failures.
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    /// True when nothing was sent or queued and at least one recipient
    /// failed outright.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.sent.is_empty() && self.queued.is_empty() && !self.failed.is_empty()
    }
}

/// Routes alert emails per recipient preferences: immediate, digest queue,
/// or drop.
pub struct EmailPipeline {
    backend: Arc<dyn EmailBackend>,
    members: Arc<dyn MemberStore>,
    digests: Arc<dyn DigestQueueStore>,
    config: MailerConfig,
}

impl std::fmt::Debug for EmailPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailPipeline")
            .field("backend", &self.backend.backend_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EmailPipeline {
    /// Create a pipeline.
    pub fn new(
        backend: Arc<dyn EmailBackend>,
        members: Arc<dyn MemberStore>,
        digests: Arc<dyn DigestQueueStore>,
        config: MailerConfig,
    ) -> Self {
        Self {
            backend,
            members,
            digests,
            config,
        }
    }

    /// The mailer configuration.
    #[must_use]
    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// The transport backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn EmailBackend> {
        &self.backend
    }

    /// Deliver one alert to the resolved recipient list.
    ///
    /// Recipients with a team-member record follow their preferences;
    /// unknown addresses are treated as immediate with no unsubscribe
    /// token. Transport failures are captured per recipient and never
    /// propagate.
    #[instrument(skip_all, fields(rule_id = %rule.id, recipients = recipients.len()))]
    pub async fn deliver(
        &self,
        project: &Project,
        rule: &AlertRule,
        alert: &AlertPayload,
        recipients: &[String],
    ) -> DeliveryReport {
        let now = Utc::now();
        let resolved = resolve_recipients(&rule.channels, recipients);
        let mut report = DeliveryReport::default();

        for recipient in resolved {
            let member = match self.members.find_by_email(&project.id, &recipient).await {
                Ok(member) => member,
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "member lookup failed, sending immediately");
                    None
                }
            };

            let Some(member) = member else {
                self.send_immediate(project, rule, alert, &recipient, None, &mut report)
                    .await;
                continue;
            };

            let prefs = &member.alert_preferences.email;
            match prefs.mode {
                EmailMode::Disabled => {
                    debug!(recipient = %recipient, "recipient disabled alert emails, dropping");
                    report.dropped.push(recipient);
                }
                EmailMode::Digest => {
                    self.enqueue_digest(project, rule, alert, &member.id, &recipient, &mut report)
                        .await;
                }
                EmailMode::Immediate => {
                    let quiet = prefs
                        .quiet_hours
                        .as_ref()
                        .is_some_and(|qh| quiet_hours_active(qh, now));
                    if quiet {
                        self.enqueue_digest(
                            project,
                            rule,
                            alert,
                            &member.id,
                            &recipient,
                            &mut report,
                        )
                        .await;
                    } else {
                        self.send_immediate(
                            project,
                            rule,
                            alert,
                            &recipient,
                            prefs.unsubscribe_token.as_deref(),
                            &mut report,
                        )
                        .await;
                    }
                }
            }
        }

        report
    }

    async fn send_immediate(
        &self,
        project: &Project,
        rule: &AlertRule,
        alert: &AlertPayload,
        recipient: &str,
        token: Option<&str>,
        report: &mut DeliveryReport,
    ) {
        let unsubscribe = unsubscribe_url(&self.config, token);
        let message = render_alert_email(
            &self.config,
            project,
            rule,
            alert,
            recipient,
            unsubscribe.as_deref(),
        );

        match self.backend.send(&message).await {
            Ok(_) => report.sent.push(recipient.to_owned()),
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "email send failed");
                report.failed.push((recipient.to_owned(), e.to_string()));
            }
        }
    }

    async fn enqueue_digest(
        &self,
        project: &Project,
        rule: &AlertRule,
        alert: &AlertPayload,
        member_id: &str,
        recipient: &str,
        report: &mut DeliveryReport,
    ) {
        let entry = DigestEntry::new(
            project.id.clone(),
            member_id,
            rule.id.clone(),
            alert.clone(),
            Utc::now(),
        );
        match self.digests.enqueue(entry).await {
            Ok(()) => {
                debug!(recipient = %recipient, "alert queued for digest");
                report.queued.push(recipient.to_owned());
            }
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "digest enqueue failed");
                report.failed.push((recipient.to_owned(), e.to_string()));
            }
        }
    }

    pub(crate) fn members(&self) -> &Arc<dyn MemberStore> {
        &self.members
    }

    pub(crate) fn digests(&self) -> &Arc<dyn DigestQueueStore> {
        &self.digests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{ChannelKind, ChannelTarget, EmailPreference, QuietHours, RuleKind};
    use faultline_core::{Severity, TeamMember};
    use faultline_email::StubBackend;
    use faultline_storage::{MemoryDigestQueue, MemoryMemberStore};

    fn pipeline() -> (
        EmailPipeline,
        Arc<StubBackend>,
        Arc<MemoryMemberStore>,
        Arc<MemoryDigestQueue>,
    ) {
        let backend = Arc::new(StubBackend::new());
        let members = Arc::new(MemoryMemberStore::new());
        let digests = Arc::new(MemoryDigestQueue::new());
        let pipeline = EmailPipeline::new(
            backend.clone(),
            members.clone(),
            digests.clone(),
            MailerConfig::new("alerts@faultline.test"),
        );
        (pipeline, backend, members, digests)
    }

    fn fixtures() -> (Project, AlertRule, AlertPayload) {
        let project = Project::new("p1", "Checkout", "k", "s");
        let rule = AlertRule {
            id: "r1".into(),
            project_id: "p1".into(),
            name: "API errors".into(),
            kind: RuleKind::NewError,
            environments: Vec::new(),
            filter: None,
            channels: vec![ChannelTarget::new(ChannelKind::Email, "a@x.test")],
            cooldown_minutes: None,
            enabled: true,
            escalation: None,
        };
        let alert = AlertPayload::new(
            "boom",
            "summary",
            Severity::High,
            "production".into(),
            Utc::now(),
        );
        (project, rule, alert)
    }

    #[tokio::test]
    async fn unknown_recipient_sends_immediately() {
        let (pipeline, backend, _, digests) = pipeline();
        let (project, rule, alert) = fixtures();

        let report = pipeline.deliver(&project, &rule, &alert, &[]).await;
        assert_eq!(report.sent, vec!["a@x.test"]);
        assert_eq!(backend.sent().len(), 1);
        assert!(digests.projects_with_unprocessed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn digest_mode_queues_instead_of_sending() {
        let (pipeline, backend, members, digests) = pipeline();
        let (project, rule, alert) = fixtures();
        members.upsert(TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest));

        let report = pipeline.deliver(&project, &rule, &alert, &[]).await;
        assert!(report.sent.is_empty());
        assert_eq!(report.queued, vec!["a@x.test"]);
        assert!(backend.sent().is_empty());

        let pending = digests
            .unprocessed_for_project(&project.id)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].member_id, "m1");
    }

    #[tokio::test]
    async fn disabled_mode_drops() {
        let (pipeline, backend, members, digests) = pipeline();
        let (project, rule, alert) = fixtures();
        members
            .upsert(TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Disabled));

        let report = pipeline.deliver(&project, &rule, &alert, &[]).await;
        assert_eq!(report.dropped, vec!["a@x.test"]);
        assert!(backend.sent().is_empty());
        assert!(digests.projects_with_unprocessed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn always_on_quiet_hours_route_to_digest() {
        let (pipeline, backend, members, _) = pipeline();
        let (project, rule, alert) = fixtures();
        let member = TeamMember::new("m1", "p1", "a@x.test").with_quiet_hours(QuietHours {
            enabled: true,
            start: "00:00".into(),
            end: "23:59".into(),
            timezone: "UTC".into(),
        });
        members.upsert(member);

        let report = pipeline.deliver(&project, &rule, &alert, &[]).await;
        assert_eq!(report.queued, vec!["a@x.test"]);
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn overrides_union_with_channel_targets() {
        let (pipeline, backend, _, _) = pipeline();
        let (project, rule, alert) = fixtures();

        let report = pipeline
            .deliver(
                &project,
                &rule,
                &alert,
                &["extra@x.test".to_owned(), "A@x.test".to_owned()],
            )
            .await;
        // a@x.test from the channel, extra@x.test from overrides; the
        // case-variant duplicate collapses.
        assert_eq!(report.sent.len(), 2);
        assert_eq!(backend.sent().len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_token_lands_in_message() {
        let (pipeline, backend, members, _) = pipeline();
        let (project, rule, alert) = fixtures();
        let mut member = TeamMember::new("m1", "p1", "a@x.test");
        member.alert_preferences.email = EmailPreference {
            unsubscribe_token: Some("tok-1".into()),
            ..EmailPreference::default()
        };
        members.upsert(member);

        let pipeline = EmailPipeline::new(
            backend.clone(),
            pipeline.members().clone(),
            pipeline.digests().clone(),
            MailerConfig::new("alerts@faultline.test")
                .with_unsubscribe_base_url("https://dash/unsub"),
        );

        pipeline.deliver(&project, &rule, &alert, &[]).await;
        let sent = backend.sent();
        assert!(sent[0].text_body.contains("https://dash/unsub?token=tok%2D1"));
    }
}
