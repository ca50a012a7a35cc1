use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{ProjectId, RuleId, Severity};

/// Delivery channel families understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
    Slack,
    Discord,
    Teams,
}

impl ChannelKind {
    /// Return the lowercase name of the channel kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Teams => "teams",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured delivery target: a channel family plus its address
/// (webhook URL, email address, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTarget {
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub target: String,
}

impl ChannelTarget {
    /// Create a channel target.
    pub fn new(kind: ChannelKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }
}

/// Rule-type-specific trigger conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Fire when at least `threshold` occurrences land within the window.
    #[serde(rename_all = "camelCase")]
    Threshold { threshold: u64, window_minutes: f64 },
    /// Fire when the occurrence rate rises by `increase_percent` over the
    /// baseline rate.
    #[serde(rename_all = "camelCase")]
    Spike {
        increase_percent: f64,
        window_minutes: f64,
        baseline_minutes: f64,
    },
    /// Fire on the first occurrence of a fingerprint.
    NewError,
    /// Fire on a severity match or a watched fingerprint.
    #[serde(rename_all = "camelCase")]
    Critical {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
        #[serde(
            default,
            alias = "fingerprint",
            deserialize_with = "one_or_many",
            skip_serializing_if = "Vec::is_empty"
        )]
        fingerprints: Vec<String>,
    },
}

impl RuleKind {
    /// The snake_case tag used in payload metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::Spike { .. } => "spike",
            Self::NewError => "new_error",
            Self::Critical { .. } => "critical",
        }
    }

    /// Whether this rule type needs occurrence counting (and therefore a
    /// fingerprint) to evaluate.
    #[must_use]
    pub fn needs_windowed_counts(&self) -> bool {
        matches!(self, Self::Threshold { .. } | Self::Spike { .. })
    }
}

/// Accept a bare string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Fields a structured filter can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    Environment,
    File,
    UserSegment,
}

/// Comparison operators for filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    In,
    NotIn,
}

impl FilterOperator {
    /// Whether this operator negates (requires universal non-match).
    #[must_use]
    pub fn is_negative(self) -> bool {
        matches!(self, Self::NotEquals | Self::NotContains | Self::NotIn)
    }
}

/// A single field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLeaf {
    pub field: FilterField,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl FilterLeaf {
    /// The operand list: `values` when non-empty, else `value` as a
    /// singleton. Empty strings are dropped.
    #[must_use]
    pub fn operands(&self) -> Vec<&str> {
        let candidates: Vec<&str> = if self.values.is_empty() {
            self.value.as_deref().into_iter().collect()
        } else {
            self.values.iter().map(String::as_str).collect()
        };
        candidates.into_iter().filter(|v| !v.is_empty()).collect()
    }
}

/// Recursive filter tree: boolean combinators over field comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Leaf(FilterLeaf),
}

/// Boolean combinator node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FilterGroup {
    And { conditions: Vec<FilterNode> },
    Or { conditions: Vec<FilterNode> },
    Not { condition: Box<FilterNode> },
}

/// One level of an escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationLevelConfig {
    pub name: String,
    pub after_minutes: f64,
    /// Channels for this level; empty means fall back to the policy-wide
    /// escalation channels.
    #[serde(default)]
    pub channels: Vec<ChannelTarget>,
}

/// Escalation policy attached to a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Fallback channels used by levels that declare none.
    #[serde(default)]
    pub channels: Vec<ChannelTarget>,
    /// Levels sorted ascending by `after_minutes`.
    #[serde(default)]
    pub levels: Vec<EscalationLevelConfig>,
}

/// A configured alert rule, scoped to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: RuleId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    /// When non-empty, only these environments can trigger the rule
    /// (matched case-insensitively).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub channels: Vec<ChannelTarget>,
    /// Per-rule cooldown; `None` falls back to the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationPolicy>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// Validate shape invariants: positive numeric conditions and
    /// ascending escalation levels.
    pub fn validate(&self) -> Result<(), String> {
        match &self.kind {
            RuleKind::Threshold {
                threshold,
                window_minutes,
            } => {
                if *threshold == 0 {
                    return Err("threshold must be positive".into());
                }
                if *window_minutes <= 0.0 || !window_minutes.is_finite() {
                    return Err("windowMinutes must be positive and finite".into());
                }
            }
            RuleKind::Spike {
                increase_percent,
                window_minutes,
                baseline_minutes,
            } => {
                if *increase_percent <= 0.0 || !increase_percent.is_finite() {
                    return Err("increasePercent must be positive and finite".into());
                }
                if *window_minutes <= 0.0 || *baseline_minutes <= 0.0 {
                    return Err("window and baseline minutes must be positive".into());
                }
            }
            RuleKind::NewError | RuleKind::Critical { .. } => {}
        }

        if let Some(escalation) = &self.escalation {
            let ascending = escalation
                .levels
                .windows(2)
                .all(|pair| pair[0].after_minutes <= pair[1].after_minutes);
            if !ascending {
                return Err("escalation levels must be sorted ascending by afterMinutes".into());
            }
            if escalation.levels.iter().any(|l| l.after_minutes <= 0.0) {
                return Err("escalation afterMinutes must be positive".into());
            }
        }

        Ok(())
    }
}
