use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use faultline_core::{
    ErrorEvent, Issue, Occurrence, Project, ProjectId, compute_fingerprint, sanitize_event,
};
use faultline_pipeline::TriggerPipeline;
use faultline_storage::{IssueStore, OccurrenceStore, StorageError};

use crate::error::IngestError;

/// Hook invoked after persistence so analytics caches can drop stale
/// aggregates. The implementation lives outside the core.
#[async_trait]
pub trait AnalyticsInvalidator: Send + Sync {
    async fn invalidate(&self, project_id: &ProjectId);
}

/// What `ingest` returns to the HTTP boundary.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub issue: Issue,
    pub occurrence: Occurrence,
    pub fingerprint: String,
    pub is_new: bool,
}

/// The ingestion entry point.
pub struct Ingestor {
    issues: Arc<dyn IssueStore>,
    occurrences: Arc<dyn OccurrenceStore>,
    pipeline: Option<Arc<TriggerPipeline>>,
    analytics: Option<Arc<dyn AnalyticsInvalidator>>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("has_pipeline", &self.pipeline.is_some())
            .field("has_analytics", &self.analytics.is_some())
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Create an ingestor without fan-out hooks.
    pub fn new(issues: Arc<dyn IssueStore>, occurrences: Arc<dyn OccurrenceStore>) -> Self {
        Self {
            issues,
            occurrences,
            pipeline: None,
            analytics: None,
        }
    }

    /// Attach the trigger pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<TriggerPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Attach the analytics invalidation hook.
    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsInvalidator>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Ingest one raw event for a project.
    ///
    /// Persists issue and occurrence synchronously, then fires the
    /// trigger pipeline and analytics hook on a background task: their
    /// failures never fail this call.
    #[instrument(skip(self, event, project), fields(project_id = %project.id))]
    pub async fn ingest(
        &self,
        event: &ErrorEvent,
        project: &Project,
    ) -> Result<IngestOutcome, IngestError> {
        if event.message.trim().is_empty() {
            return Err(IngestError::Validation("message must not be empty".into()));
        }

        let sanitized = sanitize_event(event, &project.scrub);
        let fingerprint = compute_fingerprint(&sanitized.message, &sanitized.stack_trace);
        let timestamp = sanitized.timestamp.unwrap_or_else(Utc::now);
        let environment = sanitized.environment_or_default().to_owned();
        let expires_at = expiry(project, timestamp);

        let (issue, is_new) = self
            .upsert_issue(project, &sanitized, &fingerprint, &environment, timestamp, expires_at)
            .await?;

        let mut occurrence = Occurrence::new(&issue, timestamp);
        occurrence.environment.clone_from(&environment);
        occurrence.metadata.clone_from(&sanitized.metadata);
        occurrence.user_context.clone_from(&sanitized.user_context);
        occurrence.stack_trace.clone_from(&sanitized.stack_trace);
        occurrence.expires_at = expires_at;
        self.occurrences.append(occurrence.clone()).await?;

        self.fan_out(project, &issue, &occurrence, is_new, sanitized);

        Ok(IngestOutcome {
            issue,
            occurrence,
            fingerprint,
            is_new,
        })
    }

    async fn upsert_issue(
        &self,
        project: &Project,
        sanitized: &ErrorEvent,
        fingerprint: &str,
        environment: &str,
        timestamp: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(Issue, bool), IngestError> {
        if let Some(issue) = self
            .issues
            .find_by_fingerprint(&project.id, fingerprint)
            .await?
        {
            let updated = self
                .apply_update(issue, sanitized, environment, timestamp, expires_at)
                .await?;
            return Ok((updated, false));
        }

        let mut issue = Issue::new(
            project.id.clone(),
            fingerprint,
            sanitized.message.clone(),
            environment,
            sanitized.stack_trace.clone(),
            timestamp,
        );
        issue.metadata.clone_from(&sanitized.metadata);
        issue.user_context.clone_from(&sanitized.user_context);
        issue.expires_at = expires_at;

        match self.issues.insert(issue).await {
            Ok(inserted) => Ok((inserted, true)),
            Err(StorageError::Duplicate(_)) => {
                // Lost the unique-key race: read the winner and take the
                // update path instead.
                debug!(fingerprint, "issue insert raced, retrying as update");
                let winner = self
                    .issues
                    .find_by_fingerprint(&project.id, fingerprint)
                    .await?
                    .ok_or_else(|| {
                        StorageError::Backend("race winner vanished before re-read".into())
                    })?;
                let updated = self
                    .apply_update(winner, sanitized, environment, timestamp, expires_at)
                    .await?;
                Ok((updated, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_update(
        &self,
        mut issue: Issue,
        sanitized: &ErrorEvent,
        environment: &str,
        timestamp: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Issue, IngestError> {
        issue.apply_occurrence(
            &sanitized.message,
            environment,
            &sanitized.stack_trace,
            sanitized.metadata.as_ref(),
            sanitized.user_context.as_ref(),
            timestamp,
        );
        if expires_at.is_some() {
            issue.expires_at = expires_at;
        }
        self.issues.update(&issue).await?;
        Ok(issue)
    }

    /// Fire-and-forget the post-persistence tasks.
    fn fan_out(
        &self,
        project: &Project,
        issue: &Issue,
        occurrence: &Occurrence,
        is_new: bool,
        sanitized: ErrorEvent,
    ) {
        let pipeline = self.pipeline.clone();
        let analytics = self.analytics.clone();
        let project = project.clone();
        let issue = issue.clone();
        let occurrence = occurrence.clone();

        tokio::spawn(async move {
            if let Some(analytics) = analytics {
                analytics.invalidate(&project.id).await;
            }
            if let Some(pipeline) = pipeline {
                let report = pipeline
                    .evaluate_and_dispatch(&project, &issue, &occurrence, is_new, &sanitized)
                    .await;
                debug!(?report, "trigger pass complete");
            }
        });
    }
}

fn expiry(project: &Project, timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (project.retention_days > 0)
        .then(|| timestamp + Duration::days(i64::from(project.retention_days)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use faultline_core::{ScrubPolicy, StackFrame};
    use faultline_storage::{MemoryIssueStore, MemoryOccurrenceStore};

    use super::*;

    fn project() -> Project {
        Project::new("p1", "Checkout", "k", "s").with_retention_days(30)
    }

    fn event(message: &str) -> ErrorEvent {
        ErrorEvent {
            stack_trace: vec![StackFrame {
                file: Some("src/app.js".into()),
                line: Some(10),
                column: Some(2),
                function: Some("handler".into()),
                in_app: Some(true),
            }],
            environment: Some("production".into()),
            ..ErrorEvent::new(message)
        }
    }

    fn ingestor() -> (Ingestor, Arc<MemoryIssueStore>, Arc<MemoryOccurrenceStore>) {
        let issues = Arc::new(MemoryIssueStore::new());
        let occurrences = Arc::new(MemoryOccurrenceStore::new());
        (
            Ingestor::new(issues.clone(), occurrences.clone()),
            issues,
            occurrences,
        )
    }

    #[tokio::test]
    async fn first_event_creates_issue_and_occurrence() {
        let (ingestor, issues, occurrences) = ingestor();
        let outcome = ingestor.ingest(&event("boom"), &project()).await.unwrap();

        assert!(outcome.is_new);
        assert_eq!(outcome.issue.count, 1);
        assert_eq!(outcome.fingerprint.len(), 32);
        assert!(outcome.issue.expires_at.is_some());
        assert!(outcome.occurrence.expires_at.is_some());
        assert_eq!(issues.len(), 1);
        assert_eq!(occurrences.len(), 1);
    }

    #[tokio::test]
    async fn repeated_events_group_by_fingerprint() {
        let (ingestor, issues, occurrences) = ingestor();
        let project = project();

        let first = ingestor.ingest(&event("boom"), &project).await.unwrap();
        let second = ingestor.ingest(&event("boom"), &project).await.unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.issue.count, 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(occurrences.len(), 2);
    }

    #[tokio::test]
    async fn sanitization_applies_before_storage() {
        let (ingestor, ..) = ingestor();
        let raw = event("Card 4111 1111 1111 1111 and password=hunter2");

        let first = ingestor.ingest(&raw, &project()).await.unwrap();
        assert!(first.issue.message.contains("[REDACTED:CARD]"));
        assert!(first.issue.message.contains("password=[REDACTED]"));

        // Fingerprint is computed over the sanitized message and stays
        // stable between runs.
        let second = ingestor.ingest(&raw, &project()).await.unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(!second.is_new);
    }

    #[tokio::test]
    async fn absent_fields_do_not_overwrite_existing_issue_data() {
        let (ingestor, ..) = ingestor();
        let project = project();

        let with_context = ErrorEvent {
            metadata: Some(serde_json::json!({"region": "eu"})),
            user_context: Some(serde_json::json!({"id": "u1"})),
            ..event("boom")
        };
        ingestor.ingest(&with_context, &project).await.unwrap();

        // Same fingerprint, no metadata/userContext this time.
        let bare = event("boom");
        let outcome = ingestor.ingest(&bare, &project).await.unwrap();

        assert_eq!(
            outcome.issue.metadata,
            Some(serde_json::json!({"region": "eu"}))
        );
        assert_eq!(
            outcome.issue.user_context,
            Some(serde_json::json!({"id": "u1"}))
        );
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (ingestor, ..) = ingestor();
        let err = ingestor
            .ingest(&ErrorEvent::new("   "), &project())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[tokio::test]
    async fn zero_retention_leaves_expiry_unset() {
        let (ingestor, ..) = ingestor();
        let project = Project::new("p1", "Checkout", "k", "s");
        let outcome = ingestor.ingest(&event("boom"), &project).await.unwrap();
        assert!(outcome.issue.expires_at.is_none());
        assert!(outcome.occurrence.expires_at.is_none());
    }

    /// Store wrapper that loses the unique-key race exactly once: the
    /// first `find` misses, the insert conflicts, the re-read hits.
    struct RacingIssueStore {
        inner: MemoryIssueStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl IssueStore for RacingIssueStore {
        async fn find_by_fingerprint(
            &self,
            project_id: &ProjectId,
            fingerprint: &str,
        ) -> Result<Option<Issue>, StorageError> {
            if !self.raced.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_fingerprint(project_id, fingerprint).await
        }

        async fn insert(&self, issue: Issue) -> Result<Issue, StorageError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                // A concurrent writer created the issue between our find
                // and this insert.
                let mut winner = issue.clone();
                winner.message = "winner".into();
                self.inner.insert(winner).await?;
                return Err(StorageError::Duplicate("raced".into()));
            }
            self.inner.insert(issue).await
        }

        async fn update(&self, issue: &Issue) -> Result<(), StorageError> {
            self.inner.update(issue).await
        }

        async fn find_similar(
            &self,
            project_id: &ProjectId,
            fingerprint: Option<&str>,
            environment: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Issue>, StorageError> {
            self.inner
                .find_similar(project_id, fingerprint, environment, limit)
                .await
        }

        async fn delete_older_than(
            &self,
            project_id: &ProjectId,
            cutoff: DateTime<Utc>,
        ) -> Result<u64, StorageError> {
            self.inner.delete_older_than(project_id, cutoff).await
        }
    }

    #[tokio::test]
    async fn lost_insert_race_retries_as_update() {
        let issues = Arc::new(RacingIssueStore {
            inner: MemoryIssueStore::new(),
            raced: AtomicBool::new(false),
        });
        let occurrences = Arc::new(MemoryOccurrenceStore::new());
        let ingestor = Ingestor::new(issues, occurrences.clone());

        let outcome = ingestor.ingest(&event("boom"), &project()).await.unwrap();
        assert!(!outcome.is_new, "losing the race means not-new");
        assert_eq!(outcome.issue.count, 2, "the winner's count was advanced");
        assert_eq!(occurrences.len(), 1);
    }

    #[tokio::test]
    async fn scrub_policy_is_respected() {
        let (ingestor, ..) = ingestor();
        let project = Project::new("p1", "Checkout", "k", "s").with_scrub(ScrubPolicy {
            remove_emails: true,
            remove_phones: false,
            remove_ips: false,
        });

        let outcome = ingestor
            .ingest(&event("mail from user@example.com failed"), &project)
            .await
            .unwrap();
        assert!(outcome.issue.message.contains("[REDACTED:EMAIL]"));
    }
}
