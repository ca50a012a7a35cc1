use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ProjectId;

/// A recorded deployment, surfaced in alert context when it landed close
/// to the triggering errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub project_id: ProjectId,
    /// Version tag or release name.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub deployed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Deployment {
    /// Create a deployment record.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<ProjectId>,
        version: impl Into<String>,
        deployed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            version: version.into(),
            environment: None,
            deployed_at,
            deployed_by: None,
            url: None,
        }
    }
}
