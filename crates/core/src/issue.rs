use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::StackFrame;
use crate::types::{IssueId, ProjectId};

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    New,
    Open,
    Investigating,
    Resolved,
    Ignored,
    Muted,
}

impl IssueStatus {
    /// Return the snake_case name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
            Self::Muted => "muted",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only entry in an issue's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: IssueStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
}

/// One append-only entry in an issue's assignment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
}

/// A grouped error, unique per `(project, fingerprint)`.
///
/// Invariants: `count >= 1`, `first_seen <= last_seen`, `last_seen` only
/// advances, and status transitions append to `status_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    pub project_id: ProjectId,
    pub message: String,
    pub environment: String,
    pub stack_trace: Vec<StackFrame>,
    pub fingerprint: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: IssueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    #[serde(default)]
    pub assignment_history: Vec<AssignmentChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
}

impl Issue {
    /// Create a fresh issue for its first occurrence.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: ProjectId,
        fingerprint: impl Into<String>,
        message: impl Into<String>,
        environment: impl Into<String>,
        stack_trace: Vec<StackFrame>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IssueId::new(uuid::Uuid::new_v4().to_string()),
            project_id,
            message: message.into(),
            environment: environment.into(),
            stack_trace,
            fingerprint: fingerprint.into(),
            count: 1,
            first_seen: seen_at,
            last_seen: seen_at,
            status: IssueStatus::New,
            assigned_to: None,
            status_history: vec![StatusChange {
                status: IssueStatus::New,
                at: seen_at,
                by: None,
            }],
            assignment_history: Vec::new(),
            resolved_at: None,
            expires_at: None,
            metadata: None,
            user_context: None,
        }
    }

    /// Fold a new occurrence into this issue.
    ///
    /// Increments the counter, advances `last_seen` monotonically, and
    /// overwrites message/environment/stack trace with the latest report.
    /// `metadata` is shallow-merged and `user_context` replaced, but only
    /// when the incoming event actually carried those fields.
    pub fn apply_occurrence(
        &mut self,
        message: &str,
        environment: &str,
        stack_trace: &[StackFrame],
        metadata: Option<&Value>,
        user_context: Option<&Value>,
        seen_at: DateTime<Utc>,
    ) {
        self.count += 1;
        self.last_seen = self.last_seen.max(seen_at);
        self.message = message.to_owned();
        self.environment = environment.to_owned();
        self.stack_trace = stack_trace.to_vec();
        if let Some(incoming) = metadata {
            self.metadata = Some(merge_metadata(self.metadata.as_ref(), incoming));
        }
        if let Some(incoming) = user_context {
            self.user_context = Some(incoming.clone());
        }
    }

    /// Transition to a new status, appending to the history.
    pub fn set_status(&mut self, status: IssueStatus, by: Option<String>, at: DateTime<Utc>) {
        self.status = status;
        if status == IssueStatus::Resolved {
            self.resolved_at = Some(at);
        }
        self.status_history.push(StatusChange { status, at, by });
    }

    /// Assign (or unassign with `None`), appending to the history.
    pub fn assign(&mut self, assignee: Option<String>, by: Option<String>, at: DateTime<Utc>) {
        self.assigned_to.clone_from(&assignee);
        self.assignment_history.push(AssignmentChange {
            assigned_to: assignee,
            at,
            by,
        });
    }
}

/// Shallow-merge incoming metadata over the existing object. Non-object
/// values on either side are replaced wholesale.
fn merge_metadata(existing: Option<&Value>, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(current)), Value::Object(update)) => {
            let mut merged = current.clone();
            for (key, value) in update {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

/// A single report instance linked to an issue. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: String,
    pub issue_id: IssueId,
    pub project_id: ProjectId,
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<Value>,
    #[serde(default)]
    pub stack_trace: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Occurrence {
    /// Create an occurrence for the given issue with a fresh identifier.
    pub fn new(issue: &Issue, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            issue_id: issue.id.clone(),
            project_id: issue.project_id.clone(),
            fingerprint: issue.fingerprint.clone(),
            timestamp,
            environment: issue.environment.clone(),
            metadata: None,
            user_context: None,
            stack_trace: Vec::new(),
            expires_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_at(ts: DateTime<Utc>) -> Issue {
        Issue::new(
            ProjectId::new("p1"),
            "fp1",
            "boom",
            "production",
            Vec::new(),
            ts,
        )
    }

    #[test]
    fn new_issue_starts_with_history_entry() {
        let issue = issue_at(Utc::now());
        assert_eq!(issue.count, 1);
        assert_eq!(issue.status, IssueStatus::New);
        assert_eq!(issue.status_history.len(), 1);
        assert_eq!(issue.first_seen, issue.last_seen);
    }

    #[test]
    fn apply_occurrence_advances_last_seen_monotonically() {
        let now = Utc::now();
        let mut issue = issue_at(now);
        let earlier = now - chrono::Duration::minutes(5);

        issue.apply_occurrence("boom2", "staging", &[], None, None, earlier);
        assert_eq!(issue.count, 2);
        assert_eq!(issue.last_seen, now, "out-of-order report must not rewind");
        assert_eq!(issue.message, "boom2");
        assert_eq!(issue.environment, "staging");

        let later = now + chrono::Duration::minutes(5);
        issue.apply_occurrence("boom3", "staging", &[], None, None, later);
        assert_eq!(issue.last_seen, later);
    }

    #[test]
    fn metadata_merges_only_when_present() {
        let mut issue = issue_at(Utc::now());
        issue.apply_occurrence(
            "m",
            "e",
            &[],
            Some(&json!({"a": 1})),
            None,
            Utc::now(),
        );
        issue.apply_occurrence("m", "e", &[], None, None, Utc::now());
        assert_eq!(issue.metadata, Some(json!({"a": 1})));

        issue.apply_occurrence(
            "m",
            "e",
            &[],
            Some(&json!({"b": 2})),
            Some(&json!({"id": "u1"})),
            Utc::now(),
        );
        assert_eq!(issue.metadata, Some(json!({"a": 1, "b": 2})));
        assert_eq!(issue.user_context, Some(json!({"id": "u1"})));
    }

    #[test]
    fn resolving_records_timestamp_and_history() {
        let mut issue = issue_at(Utc::now());
        let at = Utc::now();
        issue.set_status(IssueStatus::Resolved, Some("alice".into()), at);
        assert_eq!(issue.status, IssueStatus::Resolved);
        assert_eq!(issue.resolved_at, Some(at));
        assert_eq!(issue.status_history.len(), 2);
    }

    #[test]
    fn issue_serde_round_trip() {
        let issue = issue_at(Utc::now());
        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fingerprint, issue.fingerprint);
        assert_eq!(back.first_seen, issue.first_seen);
    }
}
