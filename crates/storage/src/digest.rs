use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faultline_core::{AlertPayload, ProjectId, RuleId};

/// One queued alert awaiting a member's next digest email.
///
/// Only entries with `processed = false` inside the recipient's cadence
/// window are eligible for the next digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestEntry {
    pub id: String,
    pub project_id: ProjectId,
    pub member_id: String,
    pub rule_id: RuleId,
    pub alert: AlertPayload,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl DigestEntry {
    /// Create an unprocessed entry with a fresh identifier.
    pub fn new(
        project_id: ProjectId,
        member_id: impl Into<String>,
        rule_id: RuleId,
        alert: AlertPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id,
            member_id: member_id.into(),
            rule_id,
            alert,
            created_at,
            processed: false,
            processed_at: None,
        }
    }
}
