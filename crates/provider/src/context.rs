use serde::{Deserialize, Serialize};

use faultline_core::{AlertPayload, AlertRule, Project};

/// The snapshot a channel provider renders from.
///
/// Owned copies, not references: delivery may run concurrently with engine
/// mutation, so providers only ever see an immutable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContext {
    pub project: Project,
    pub rule: AlertRule,
    pub alert: AlertPayload,
}

impl NotificationContext {
    /// Build a context from snapshots.
    #[must_use]
    pub fn new(project: Project, rule: AlertRule, alert: AlertPayload) -> Self {
        Self {
            project,
            rule,
            alert,
        }
    }
}
