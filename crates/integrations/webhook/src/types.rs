use chrono::{DateTime, Utc};
use serde::Serialize;

use faultline_core::{AlertLinks, AlertPayload};
use faultline_provider::NotificationContext;

/// Compact project projection sent to webhook receivers. Credential
/// material never leaves the process.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// Compact rule projection sent to webhook receivers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
}

/// The JSON body posted to webhook targets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub timestamp: DateTime<Utc>,
    pub project: ProjectRef,
    pub rule: RuleRef,
    pub alert: AlertPayload,
    pub links: AlertLinks,
}

impl WebhookEnvelope {
    /// Build the envelope from a notification snapshot.
    #[must_use]
    pub fn from_context(context: &NotificationContext, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            project: ProjectRef {
                id: context.project.id.to_string(),
                name: context.project.name.clone(),
            },
            rule: RuleRef {
                id: context.rule.id.to_string(),
                name: context.rule.name.clone(),
                rule_type: context.rule.kind.as_str().to_owned(),
            },
            alert: context.alert.clone(),
            links: context.alert.links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{AlertRule, Project, RuleKind, Severity};

    #[test]
    fn envelope_carries_no_credentials() {
        let context = NotificationContext::new(
            Project::new("p1", "Checkout", "secret-key-value", "salt"),
            AlertRule {
                id: "r1".into(),
                project_id: "p1".into(),
                name: "API errors".into(),
                kind: RuleKind::NewError,
                environments: Vec::new(),
                filter: None,
                channels: Vec::new(),
                cooldown_minutes: None,
                enabled: true,
                escalation: None,
            },
            AlertPayload::new("t", "s", Severity::High, "prod".into(), Utc::now()),
        );

        let envelope = WebhookEnvelope::from_context(&context, Utc::now());
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("secret-key-value"));
        assert!(!json.contains("apiKeyHash"));
        assert!(json.contains("\"type\":\"new_error\""));
    }
}
