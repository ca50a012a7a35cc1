use async_trait::async_trait;
use chrono::{DateTime, Utc};

use faultline_core::{
    AlertRule, Deployment, Issue, Occurrence, Project, ProjectId, RuleId, TeamMember,
};

use crate::digest::DigestEntry;
use crate::error::StorageError;

/// Issue repository: grouped errors unique per `(project, fingerprint)`.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Look up an issue by its grouping key.
    async fn find_by_fingerprint(
        &self,
        project_id: &ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Issue>, StorageError>;

    /// Insert a fresh issue. Fails with [`StorageError::Duplicate`] when
    /// the `(project, fingerprint)` key already exists, so the caller can
    /// retry via the update path.
    async fn insert(&self, issue: Issue) -> Result<Issue, StorageError>;

    /// Replace an existing issue by id.
    async fn update(&self, issue: &Issue) -> Result<(), StorageError>;

    /// Issues related to an alert: same fingerprint, or failing that the
    /// same environment, sorted by `last_seen` descending.
    async fn find_similar(
        &self,
        project_id: &ProjectId,
        fingerprint: Option<&str>,
        environment: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Issue>, StorageError>;

    /// Delete issues whose `last_seen` predates the cutoff. Returns the
    /// number removed.
    async fn delete_older_than(
        &self,
        project_id: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}

/// Occurrence repository: immutable report instances.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Append an occurrence.
    async fn append(&self, occurrence: Occurrence) -> Result<(), StorageError>;

    /// Count occurrences for a fingerprint inside `[start, end]` (or
    /// `[start, end)` when `include_end` is false), optionally restricted
    /// to one environment.
    async fn count_range(
        &self,
        project_id: &ProjectId,
        fingerprint: &str,
        environment: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_end: bool,
    ) -> Result<u64, StorageError>;

    /// Delete occurrences whose timestamp predates the cutoff. Returns
    /// the number removed.
    async fn delete_older_than(
        &self,
        project_id: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}

/// Read access to alert rules. Rule CRUD lives outside the core; the
/// pipeline only loads.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All enabled rules for a project in deterministic (id) order.
    async fn list_enabled(&self, project_id: &ProjectId) -> Result<Vec<AlertRule>, StorageError>;

    /// Fetch one rule.
    async fn get(
        &self,
        project_id: &ProjectId,
        rule_id: &RuleId,
    ) -> Result<Option<AlertRule>, StorageError>;
}

/// Read access to projects.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Resolve the project owning a presented bearer credential.
    async fn find_by_api_key(&self, presented: &str) -> Result<Option<Project>, StorageError>;

    /// Fetch one project.
    async fn get(&self, project_id: &ProjectId) -> Result<Option<Project>, StorageError>;

    /// All projects (the retention sweeper scans these).
    async fn list(&self) -> Result<Vec<Project>, StorageError>;
}

/// Read access to deployment records for context enrichment.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Deployments within `reference ± lookback`, newest first.
    async fn recent(
        &self,
        project_id: &ProjectId,
        reference: DateTime<Utc>,
        lookback: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Deployment>, StorageError>;
}

/// Team member lookups for the email pipeline.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Find a member by email, case-insensitively.
    async fn find_by_email(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> Result<Option<TeamMember>, StorageError>;

    /// Fetch one member by id.
    async fn get(
        &self,
        project_id: &ProjectId,
        member_id: &str,
    ) -> Result<Option<TeamMember>, StorageError>;

    /// Record the instant a digest was sent to a member.
    async fn update_digest_sent(
        &self,
        project_id: &ProjectId,
        member_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// The queue feeding the digest scheduler.
#[async_trait]
pub trait DigestQueueStore: Send + Sync {
    /// Enqueue an entry.
    async fn enqueue(&self, entry: DigestEntry) -> Result<(), StorageError>;

    /// Projects that currently have unprocessed entries.
    async fn projects_with_unprocessed(&self) -> Result<Vec<ProjectId>, StorageError>;

    /// Unprocessed entries for a project, ordered by `created_at`
    /// ascending.
    async fn unprocessed_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<DigestEntry>, StorageError>;

    /// Mark entries processed at the given instant.
    async fn mark_processed(
        &self,
        entry_ids: &[String],
        processed_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}
