use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use faultline_core::{EmailMode, ProjectId};
use faultline_storage::{DigestEntry, ProjectStore};

use crate::pipeline::EmailPipeline;
use crate::render::render_digest_email;

/// Default interval between digest sweeps.
pub const DEFAULT_DIGEST_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Processes the digest queue: for each member whose cadence window has
/// elapsed, renders and sends one digest email and marks the entries
/// processed.
pub struct DigestProcessor {
    pipeline: Arc<EmailPipeline>,
    projects: Arc<dyn ProjectStore>,
}

impl std::fmt::Debug for DigestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestProcessor").finish_non_exhaustive()
    }
}

impl DigestProcessor {
    /// Create a processor.
    pub fn new(pipeline: Arc<EmailPipeline>, projects: Arc<dyn ProjectStore>) -> Self {
        Self { pipeline, projects }
    }

    /// One sweep over every project with unprocessed entries. Returns the
    /// number of digest emails sent.
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> usize {
        let project_ids = match self.pipeline.digests().projects_with_unprocessed().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "listing digest projects failed");
                return 0;
            }
        };

        let mut sent = 0;
        for project_id in project_ids {
            match self.process_project(&project_id, now).await {
                Ok(count) => sent += count,
                Err(e) => warn!(project_id = %project_id, error = %e, "digest sweep failed for project"),
            }
        }
        sent
    }

    async fn process_project(
        &self,
        project_id: &ProjectId,
        now: DateTime<Utc>,
    ) -> Result<usize, String> {
        let project = self
            .projects
            .get(project_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("unknown project {project_id}"))?;

        let entries = self
            .pipeline
            .digests()
            .unprocessed_for_project(project_id)
            .await
            .map_err(|e| e.to_string())?;

        let mut by_member: BTreeMap<String, Vec<DigestEntry>> = BTreeMap::new();
        for entry in entries {
            by_member.entry(entry.member_id.clone()).or_default().push(entry);
        }

        let mut sent = 0;
        for (member_id, member_entries) in by_member {
            let member = match self.pipeline.members().get(project_id, &member_id).await {
                Ok(Some(member)) => member,
                Ok(None) => {
                    warn!(member_id = %member_id, "digest entries for unknown member, dropping");
                    self.mark_all(&member_entries, now).await;
                    continue;
                }
                Err(e) => {
                    warn!(member_id = %member_id, error = %e, "member lookup failed, keeping entries");
                    continue;
                }
            };

            let prefs = &member.alert_preferences.email;
            if prefs.mode == EmailMode::Disabled {
                debug!(member_id = %member_id, "member disabled emails, dropping queued entries");
                self.mark_all(&member_entries, now).await;
                continue;
            }

            let cadence = prefs.digest.cadence;
            let window = cadence.window();
            let due = prefs
                .digest
                .last_sent_at
                .is_none_or(|last| now - last >= window);
            if !due {
                continue;
            }

            // Entries older than the cadence window are no longer eligible;
            // they are retired without being listed.
            let (eligible, expired): (Vec<DigestEntry>, Vec<DigestEntry>) = member_entries
                .into_iter()
                .partition(|entry| now - entry.created_at <= window);

            if !expired.is_empty() {
                debug!(
                    member_id = %member_id,
                    expired = expired.len(),
                    "retiring digest entries older than the cadence window"
                );
                self.mark_all(&expired, now).await;
            }

            if eligible.is_empty() {
                continue;
            }

            let message =
                render_digest_email(self.pipeline.config(), &project, &member, &eligible);
            if let Err(e) = self.pipeline.backend().send(&message).await {
                warn!(member_id = %member_id, error = %e, "digest send failed, will retry next sweep");
                continue;
            }

            self.mark_all(&eligible, now).await;
            if let Err(e) = self
                .pipeline
                .members()
                .update_digest_sent(project_id, &member_id, now)
                .await
            {
                warn!(member_id = %member_id, error = %e, "recording digest send time failed");
            }
            info!(member_id = %member_id, alerts = eligible.len(), "digest sent");
            sent += 1;
        }

        Ok(sent)
    }

    async fn mark_all(&self, entries: &[DigestEntry], now: DateTime<Utc>) {
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        if let Err(e) = self.pipeline.digests().mark_processed(&ids, now).await {
            warn!(error = %e, "marking digest entries processed failed");
        }
    }
}

/// Periodic driver for the [`DigestProcessor`].
#[derive(Debug)]
pub struct DigestScheduler {
    handle: JoinHandle<()>,
}

impl DigestScheduler {
    /// Spawn a sweep every `interval`.
    #[must_use]
    pub fn spawn(processor: Arc<DigestProcessor>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the first sweep
            // happens one interval after boot.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                processor.run_once(Utc::now()).await;
            }
        });
        Self { handle }
    }

    /// Stop the scheduler.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for DigestScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailerConfig;
    use faultline_core::{AlertPayload, DigestCadence, Project, Severity, TeamMember};
    use faultline_email::StubBackend;
    use faultline_storage::{
        DigestQueueStore, MemberStore, MemoryDigestQueue, MemoryMemberStore, MemoryProjectStore,
    };

    struct Fixture {
        processor: DigestProcessor,
        backend: Arc<StubBackend>,
        members: Arc<MemoryMemberStore>,
        digests: Arc<MemoryDigestQueue>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(StubBackend::new());
        let members = Arc::new(MemoryMemberStore::new());
        let digests = Arc::new(MemoryDigestQueue::new());
        let projects = Arc::new(MemoryProjectStore::new());
        projects.upsert(Project::new("p1", "Checkout", "k", "s"));

        let pipeline = Arc::new(EmailPipeline::new(
            backend.clone(),
            members.clone(),
            digests.clone(),
            MailerConfig::new("alerts@faultline.test"),
        ));
        Fixture {
            processor: DigestProcessor::new(pipeline, projects),
            backend,
            members,
            digests,
        }
    }

    fn entry(member_id: &str, created_at: DateTime<Utc>) -> DigestEntry {
        DigestEntry::new(
            "p1".into(),
            member_id,
            "r1".into(),
            AlertPayload::new("boom", "s", Severity::High, "prod".into(), created_at),
            created_at,
        )
    }

    #[tokio::test]
    async fn due_member_gets_one_digest_and_entries_are_marked() {
        let f = fixture();
        let now = Utc::now();
        f.members.upsert(
            TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest),
        );
        f.digests
            .enqueue(entry("m1", now - chrono::Duration::minutes(20)))
            .await
            .unwrap();

        let sent = f.processor.run_once(now).await;
        assert_eq!(sent, 1);
        assert_eq!(f.backend.sent().len(), 1);
        assert!(f.backend.sent()[0].subject.contains("1 alerts"));

        // Entries are processed and lastSentAt recorded.
        assert!(
            f.digests
                .unprocessed_for_project(&"p1".into())
                .await
                .unwrap()
                .is_empty()
        );
        let member = f.members.get(&"p1".into(), "m1").await.unwrap().unwrap();
        assert_eq!(
            member.alert_preferences.email.digest.last_sent_at,
            Some(now)
        );
    }

    #[tokio::test]
    async fn member_inside_cadence_window_is_skipped() {
        let f = fixture();
        let now = Utc::now();
        let mut member =
            TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest);
        member.alert_preferences.email.digest.last_sent_at =
            Some(now - chrono::Duration::hours(2));
        member.alert_preferences.email.digest.cadence = DigestCadence::Daily;
        f.members.upsert(member);
        f.digests.enqueue(entry("m1", now)).await.unwrap();

        let sent = f.processor.run_once(now).await;
        assert_eq!(sent, 0);
        assert!(f.backend.sent().is_empty());
        // Entry stays queued for the next due sweep.
        assert_eq!(
            f.digests
                .unprocessed_for_project(&"p1".into())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn disabled_member_entries_are_dropped_silently() {
        let f = fixture();
        let now = Utc::now();
        f.members.upsert(
            TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Disabled),
        );
        f.digests.enqueue(entry("m1", now)).await.unwrap();

        let sent = f.processor.run_once(now).await;
        assert_eq!(sent, 0);
        assert!(f.backend.sent().is_empty());
        assert!(
            f.digests
                .unprocessed_for_project(&"p1".into())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn entries_older_than_the_window_are_retired_unsent() {
        let f = fixture();
        let now = Utc::now();
        f.members.upsert(
            TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest),
        );
        f.digests
            .enqueue(entry("m1", now - chrono::Duration::days(3)))
            .await
            .unwrap();

        let sent = f.processor.run_once(now).await;
        assert_eq!(sent, 0);
        assert!(f.backend.sent().is_empty());
        assert!(
            f.digests
                .unprocessed_for_project(&"p1".into())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn weekly_cadence_uses_seven_day_window() {
        let f = fixture();
        let now = Utc::now();
        let mut member =
            TeamMember::new("m1", "p1", "a@x.test").with_email_mode(EmailMode::Digest);
        member.alert_preferences.email.digest.cadence = DigestCadence::Weekly;
        member.alert_preferences.email.digest.last_sent_at =
            Some(now - chrono::Duration::days(8));
        f.members.upsert(member);
        f.digests
            .enqueue(entry("m1", now - chrono::Duration::days(2)))
            .await
            .unwrap();

        let sent = f.processor.run_once(now).await;
        assert_eq!(sent, 1);
        assert!(f.backend.sent()[0].subject.contains("weekly"));
    }
}
