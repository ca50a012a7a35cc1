use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use faultline_storage::{IssueStore, OccurrenceStore, ProjectStore};

/// Deletes issues and occurrences older than each project's retention
/// window. Per-project failures are logged and never stop the scan.
pub struct RetentionSweeper {
    projects: Arc<dyn ProjectStore>,
    issues: Arc<dyn IssueStore>,
    occurrences: Arc<dyn OccurrenceStore>,
}

impl std::fmt::Debug for RetentionSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionSweeper").finish_non_exhaustive()
    }
}

impl RetentionSweeper {
    /// Create a sweeper.
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        issues: Arc<dyn IssueStore>,
        occurrences: Arc<dyn OccurrenceStore>,
    ) -> Self {
        Self {
            projects,
            issues,
            occurrences,
        }
    }

    /// One pass over every project with retention enabled. Returns the
    /// total number of deleted records.
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> u64 {
        let projects = match self.projects.list().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "listing projects failed, skipping retention pass");
                return 0;
            }
        };

        let mut deleted = 0;
        for project in projects {
            if project.retention_days < 1 {
                continue;
            }
            let cutoff = now - chrono::Duration::days(i64::from(project.retention_days));

            match self.occurrences.delete_older_than(&project.id, cutoff).await {
                Ok(count) => deleted += count,
                Err(e) => {
                    warn!(project_id = %project.id, error = %e, "occurrence cleanup failed");
                    continue;
                }
            }
            match self.issues.delete_older_than(&project.id, cutoff).await {
                Ok(count) => {
                    deleted += count;
                    debug!(project_id = %project.id, "retention pass complete");
                }
                Err(e) => {
                    warn!(project_id = %project.id, error = %e, "issue cleanup failed");
                }
            }
        }

        if deleted > 0 {
            info!(deleted, "retention sweep removed expired records");
        }
        deleted
    }
}

/// Periodic driver for the [`RetentionSweeper`].
#[derive(Debug)]
pub struct RetentionScheduler {
    handle: JoinHandle<()>,
}

impl RetentionScheduler {
    /// Spawn a sweep every `interval`.
    #[must_use]
    pub fn spawn(sweeper: Arc<RetentionSweeper>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweeper.run_once(Utc::now()).await;
            }
        });
        Self { handle }
    }

    /// Stop the scheduler.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for RetentionScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
