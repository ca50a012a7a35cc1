//! In-memory repository implementations.
//!
//! Backed by [`DashMap`]s and a coarse [`RwLock`] for the occurrence log.
//! These serve as the in-process backend for the server and as fixtures
//! for pipeline tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use faultline_core::{
    AlertRule, Deployment, Issue, Occurrence, Project, ProjectId, RuleId, TeamMember,
};

use crate::digest::DigestEntry;
use crate::error::StorageError;
use crate::store::{
    DeploymentStore, DigestQueueStore, IssueStore, MemberStore, OccurrenceStore, ProjectStore,
    RuleStore,
};

fn grouping_key(project_id: &ProjectId, fingerprint: &str) -> String {
    format!("{project_id}:{fingerprint}")
}

/// In-memory [`IssueStore`] keyed by `(project, fingerprint)`.
#[derive(Debug, Default)]
pub struct MemoryIssueStore {
    by_key: DashMap<String, Issue>,
}

impl MemoryIssueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored issues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[async_trait]
impl IssueStore for MemoryIssueStore {
    async fn find_by_fingerprint(
        &self,
        project_id: &ProjectId,
        fingerprint: &str,
    ) -> Result<Option<Issue>, StorageError> {
        Ok(self
            .by_key
            .get(&grouping_key(project_id, fingerprint))
            .map(|issue| issue.clone()))
    }

    async fn insert(&self, issue: Issue) -> Result<Issue, StorageError> {
        let key = grouping_key(&issue.project_id, &issue.fingerprint);
        match self.by_key.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::Duplicate(key)),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(issue.clone());
                Ok(issue)
            }
        }
    }

    async fn update(&self, issue: &Issue) -> Result<(), StorageError> {
        let key = grouping_key(&issue.project_id, &issue.fingerprint);
        match self.by_key.get_mut(&key) {
            Some(mut stored) => {
                *stored = issue.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn find_similar(
        &self,
        project_id: &ProjectId,
        fingerprint: Option<&str>,
        environment: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Issue>, StorageError> {
        let mut matches: Vec<Issue> = self
            .by_key
            .iter()
            .filter(|entry| entry.project_id == *project_id)
            .filter(|entry| match (fingerprint, environment) {
                (Some(fp), _) => entry.fingerprint == fp,
                (None, Some(env)) => entry.environment == env,
                (None, None) => false,
            })
            .map(|entry| entry.clone())
            .collect();

        matches.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_older_than(
        &self,
        project_id: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let stale: Vec<String> = self
            .by_key
            .iter()
            .filter(|entry| entry.project_id == *project_id && entry.last_seen < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let removed = stale.len() as u64;
        for key in stale {
            self.by_key.remove(&key);
        }
        Ok(removed)
    }
}

/// In-memory [`OccurrenceStore`]: an append-only log per project.
#[derive(Debug, Default)]
pub struct MemoryOccurrenceStore {
    log: RwLock<Vec<Occurrence>>,
}

impl MemoryOccurrenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of occurrences across all projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }
}

#[async_trait]
impl OccurrenceStore for MemoryOccurrenceStore {
    async fn append(&self, occurrence: Occurrence) -> Result<(), StorageError> {
        self.log.write().push(occurrence);
        Ok(())
    }

    async fn count_range(
        &self,
        project_id: &ProjectId,
        fingerprint: &str,
        environment: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        include_end: bool,
    ) -> Result<u64, StorageError> {
        let count = self
            .log
            .read()
            .iter()
            .filter(|occ| occ.project_id == *project_id && occ.fingerprint == fingerprint)
            .filter(|occ| environment.is_none_or(|env| occ.environment == env))
            .filter(|occ| {
                occ.timestamp >= start
                    && if include_end {
                        occ.timestamp <= end
                    } else {
                        occ.timestamp < end
                    }
            })
            .count();
        Ok(count as u64)
    }

    async fn delete_older_than(
        &self,
        project_id: &ProjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut log = self.log.write();
        let before = log.len();
        log.retain(|occ| !(occ.project_id == *project_id && occ.timestamp < cutoff));
        Ok((before - log.len()) as u64)
    }
}

/// In-memory [`RuleStore`]. Rules are seeded through [`upsert`](Self::upsert)
/// (configuration load, tests); the trait only exposes reads.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: DashMap<String, AlertRule>,
}

impl MemoryRuleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule.
    pub fn upsert(&self, rule: AlertRule) {
        let key = format!("{}:{}", rule.project_id, rule.id);
        self.rules.insert(key, rule);
    }

    /// Remove a rule.
    pub fn remove(&self, project_id: &ProjectId, rule_id: &RuleId) -> bool {
        self.rules
            .remove(&format!("{project_id}:{rule_id}"))
            .is_some()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_enabled(&self, project_id: &ProjectId) -> Result<Vec<AlertRule>, StorageError> {
        let mut rules: Vec<AlertRule> = self
            .rules
            .iter()
            .filter(|entry| entry.project_id == *project_id && entry.enabled)
            .map(|entry| entry.clone())
            .collect();
        rules.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(rules)
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        rule_id: &RuleId,
    ) -> Result<Option<AlertRule>, StorageError> {
        Ok(self
            .rules
            .get(&format!("{project_id}:{rule_id}"))
            .map(|rule| rule.clone()))
    }
}

/// In-memory [`ProjectStore`], seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: DashMap<String, Project>,
}

impl MemoryProjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a project.
    pub fn upsert(&self, project: Project) {
        self.projects.insert(project.id.to_string(), project);
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_by_api_key(&self, presented: &str) -> Result<Option<Project>, StorageError> {
        Ok(self
            .projects
            .iter()
            .find(|entry| entry.verify_api_key(presented))
            .map(|entry| entry.clone()))
    }

    async fn get(&self, project_id: &ProjectId) -> Result<Option<Project>, StorageError> {
        Ok(self
            .projects
            .get(project_id.as_str())
            .map(|project| project.clone()))
    }

    async fn list(&self) -> Result<Vec<Project>, StorageError> {
        let mut projects: Vec<Project> =
            self.projects.iter().map(|entry| entry.clone()).collect();
        projects.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(projects)
    }
}

/// In-memory [`DeploymentStore`], seeded via [`record`](Self::record).
#[derive(Debug, Default)]
pub struct MemoryDeploymentStore {
    deployments: RwLock<Vec<Deployment>>,
}

impl MemoryDeploymentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployment.
    pub fn record(&self, deployment: Deployment) {
        self.deployments.write().push(deployment);
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn recent(
        &self,
        project_id: &ProjectId,
        reference: DateTime<Utc>,
        lookback: chrono::Duration,
        limit: usize,
    ) -> Result<Vec<Deployment>, StorageError> {
        let from = reference - lookback;
        let to = reference + lookback;
        let mut matches: Vec<Deployment> = self
            .deployments
            .read()
            .iter()
            .filter(|d| {
                d.project_id == *project_id && d.deployed_at >= from && d.deployed_at <= to
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.deployed_at.cmp(&a.deployed_at));
        matches.truncate(limit);
        Ok(matches)
    }
}

/// In-memory [`MemberStore`], seeded via [`upsert`](Self::upsert).
#[derive(Debug, Default)]
pub struct MemoryMemberStore {
    members: DashMap<String, TeamMember>,
}

impl MemoryMemberStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member.
    pub fn upsert(&self, member: TeamMember) {
        let key = format!("{}:{}", member.project_id, member.id);
        self.members.insert(key, member);
    }
}

#[async_trait]
impl MemberStore for MemoryMemberStore {
    async fn find_by_email(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> Result<Option<TeamMember>, StorageError> {
        let wanted = email.to_lowercase();
        Ok(self
            .members
            .iter()
            .find(|entry| {
                entry.project_id == *project_id && entry.email.to_lowercase() == wanted
            })
            .map(|entry| entry.clone()))
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        member_id: &str,
    ) -> Result<Option<TeamMember>, StorageError> {
        Ok(self
            .members
            .get(&format!("{project_id}:{member_id}"))
            .map(|member| member.clone()))
    }

    async fn update_digest_sent(
        &self,
        project_id: &ProjectId,
        member_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let key = format!("{project_id}:{member_id}");
        match self.members.get_mut(&key) {
            Some(mut member) => {
                member.alert_preferences.email.digest.last_sent_at = Some(sent_at);
                Ok(())
            }
            None => Err(StorageError::NotFound(key)),
        }
    }
}

/// In-memory [`DigestQueueStore`].
#[derive(Debug, Default)]
pub struct MemoryDigestQueue {
    entries: DashMap<String, DigestEntry>,
}

impl MemoryDigestQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DigestQueueStore for MemoryDigestQueue {
    async fn enqueue(&self, entry: DigestEntry) -> Result<(), StorageError> {
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn projects_with_unprocessed(&self) -> Result<Vec<ProjectId>, StorageError> {
        let mut projects: Vec<ProjectId> = Vec::new();
        for entry in &self.entries {
            if !entry.processed && !projects.contains(&entry.project_id) {
                projects.push(entry.project_id.clone());
            }
        }
        projects.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(projects)
    }

    async fn unprocessed_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<DigestEntry>, StorageError> {
        let mut entries: Vec<DigestEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.project_id == *project_id && !entry.processed)
            .map(|entry| entry.clone())
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn mark_processed(
        &self,
        entry_ids: &[String],
        processed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        for id in entry_ids {
            if let Some(mut entry) = self.entries.get_mut(id) {
                entry.processed = true;
                entry.processed_at = Some(processed_at);
            }
        }
        Ok(())
    }
}
