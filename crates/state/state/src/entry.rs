use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faultline_core::{AlertPayload, AlertRule, ChannelTarget, Project};

/// One cooldown row: the rule and the epoch milliseconds of its last
/// successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownEntry {
    pub key: String,
    pub timestamp_ms: i64,
}

/// A normalized escalation level with its absolute firing instant, so
/// progress survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationLevel {
    pub name: String,
    pub after_minutes: f64,
    pub channels: Vec<ChannelTarget>,
    pub trigger_at: DateTime<Utc>,
}

/// Durable escalation state for one dispatched alert.
///
/// Carries its own project/rule/alert snapshots rather than references to
/// live objects; everything here is JSON-safe and round-trips through the
/// store unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationEntry {
    /// The alert identifier this entry escalates.
    pub id: String,
    pub project: Project,
    pub rule: AlertRule,
    pub alert: AlertPayload,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub resolved: bool,
    /// Levels still to fire, ascending by `after_minutes`.
    #[serde(default)]
    pub pending_levels: Vec<EscalationLevel>,
    #[serde(default)]
    pub current_level: u32,
}

impl EscalationEntry {
    /// Whether this entry is finished and safe to drop.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.acknowledged || self.resolved || self.pending_levels.is_empty()
    }

    /// The next level to fire, if any.
    #[must_use]
    pub fn next_level(&self) -> Option<&EscalationLevel> {
        self.pending_levels.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{ChannelKind, RuleKind, Severity};

    fn entry() -> EscalationEntry {
        let project = Project::new("p1", "Checkout", "key", "salt");
        let rule = AlertRule {
            id: "r1".into(),
            project_id: "p1".into(),
            name: "errors".into(),
            kind: RuleKind::NewError,
            environments: Vec::new(),
            filter: None,
            channels: vec![ChannelTarget::new(ChannelKind::Webhook, "https://h/x")],
            cooldown_minutes: None,
            enabled: true,
            escalation: None,
        };
        let alert = AlertPayload::new(
            "boom",
            "summary",
            Severity::High,
            "production".into(),
            Utc::now(),
        );
        let sent_at = Utc::now();
        EscalationEntry {
            id: "alert-1".into(),
            project,
            rule,
            alert,
            sent_at,
            acknowledged: false,
            resolved: false,
            pending_levels: vec![
                EscalationLevel {
                    name: "On-call".into(),
                    after_minutes: 30.0,
                    channels: Vec::new(),
                    trigger_at: sent_at + chrono::Duration::minutes(30),
                },
                EscalationLevel {
                    name: "Manager escalation".into(),
                    after_minutes: 120.0,
                    channels: Vec::new(),
                    trigger_at: sent_at + chrono::Duration::minutes(120),
                },
            ],
            current_level: 0,
        }
    }

    #[test]
    fn serde_round_trip_preserves_dates_and_level_order() {
        let original = entry();
        let json = serde_json::to_string(&original).unwrap();
        let back: EscalationEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, original.id);
        assert_eq!(back.sent_at, original.sent_at);
        assert_eq!(back.pending_levels.len(), 2);
        assert_eq!(back.pending_levels[0].name, "On-call");
        assert_eq!(
            back.pending_levels[0].trigger_at,
            original.pending_levels[0].trigger_at
        );
        assert!(back.pending_levels[0].after_minutes < back.pending_levels[1].after_minutes);
    }

    #[test]
    fn settled_when_acknowledged_resolved_or_exhausted() {
        let mut e = entry();
        assert!(!e.is_settled());
        e.acknowledged = true;
        assert!(e.is_settled());

        let mut e = entry();
        e.resolved = true;
        assert!(e.is_settled());

        let mut e = entry();
        e.pending_levels.clear();
        assert!(e.is_settled());
    }
}
