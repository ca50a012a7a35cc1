use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::deployment::Deployment;
use crate::types::Severity;

/// The environment field of an alert: a single label for plain alerts, a
/// list for aggregated ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environments {
    One(String),
    Many(Vec<String>),
}

impl Environments {
    /// All labels carried by this field.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::One(label) => vec![label.as_str()],
            Self::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }

    /// Union several environment fields, deduplicated in first-seen order.
    #[must_use]
    pub fn union<'a>(fields: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut seen = Vec::new();
        for field in fields {
            for label in field.labels() {
                if !seen.iter().any(|s: &String| s == label) {
                    seen.push(label.to_owned());
                }
            }
        }
        if seen.len() == 1 {
            Self::One(seen.remove(0))
        } else {
            Self::Many(seen)
        }
    }
}

impl Default for Environments {
    fn default() -> Self {
        Self::One(String::new())
    }
}

impl From<&str> for Environments {
    fn from(label: &str) -> Self {
        Self::One(label.to_owned())
    }
}

/// Compact projection of an issue used inside alert context blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub id: String,
    pub message: String,
    pub environment: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Contextual insights attached to an alert before dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertContext {
    #[serde(default)]
    pub recent_deployments: Vec<Deployment>,
    #[serde(default)]
    pub similar_incidents: Vec<IssueSummary>,
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why_it_matters: Option<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Links rendered into notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<String>,
}

/// The alert handed from the trigger pipeline to the notification engine
/// and on to the channels. JSON-safe by construction so snapshots survive
/// persistence inside escalation entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// Assigned at dispatch when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    #[serde(default)]
    pub environment: Environments,
    #[serde(default)]
    pub occurrences: u64,
    #[serde(default)]
    pub affected_users: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub first_detected_at: DateTime<Utc>,
    pub last_detected_at: DateTime<Utc>,
    /// Free-form block carrying rule id/type, reason code, and after
    /// aggregation the `aggregation` summary.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub links: AlertLinks,
    #[serde(default)]
    pub context: AlertContext,
}

impl AlertPayload {
    /// Create a payload with the required fields; everything else starts
    /// empty.
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        severity: Severity,
        environment: Environments,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            summary: summary.into(),
            severity,
            environment,
            occurrences: 0,
            affected_users: 0,
            fingerprint: None,
            first_detected_at: detected_at,
            last_detected_at: detected_at,
            metadata: Map::new(),
            links: AlertLinks::default(),
            context: AlertContext::default(),
        }
    }

    /// Insert a metadata entry.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Read a string metadata entry.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_serde_accepts_string_or_list() {
        let one: Environments = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(one, Environments::One("production".into()));

        let many: Environments = serde_json::from_str(r#"["prod", "staging"]"#).unwrap();
        assert_eq!(many.labels(), vec!["prod", "staging"]);
    }

    #[test]
    fn environment_union_dedupes_in_order() {
        let fields = [
            Environments::One("prod".into()),
            Environments::Many(vec!["staging".into(), "prod".into()]),
        ];
        let union = Environments::union(&fields);
        assert_eq!(union.labels(), vec!["prod", "staging"]);
    }

    #[test]
    fn single_label_union_collapses_to_one() {
        let fields = [
            Environments::One("prod".into()),
            Environments::One("prod".into()),
        ];
        assert_eq!(
            Environments::union(&fields),
            Environments::One("prod".into())
        );
    }

    #[test]
    fn payload_round_trips_with_metadata() {
        let mut alert = AlertPayload::new(
            "API errors",
            "Detected 3 occurrences",
            Severity::High,
            "production".into(),
            Utc::now(),
        );
        alert.set_meta("ruleId", "r1");
        alert.set_meta("reason", "threshold_exceeded");

        let json = serde_json::to_string(&alert).unwrap();
        let back: AlertPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.meta_str("reason"), Some("threshold_exceeded"));
        assert_eq!(back.severity, Severity::High);
        assert_eq!(back.environment.labels(), vec!["production"]);
    }
}
