use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faultline_core::Severity;

/// The metrics block handed to the evaluator for one `(rule, occurrence)`
/// pair. The trigger pipeline fills the windowed fields only for rule
/// types that need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub is_new: bool,
    /// First non-empty file among the stack frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Deduplicated user segments from user context and metadata.
    #[serde(default)]
    pub user_segments: Vec<String>,
    /// Occurrences counted inside the rule's window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_count: Option<u64>,
    /// Measured window length in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    /// Occurrences counted inside the baseline span preceding the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_minutes: Option<f64>,
}

impl RuleMetrics {
    /// Metrics for a plain occurrence without windowed counts.
    pub fn for_occurrence(
        environment: impl Into<String>,
        fingerprint: Option<String>,
        is_new: bool,
    ) -> Self {
        Self {
            environment: Some(environment.into()),
            fingerprint,
            is_new,
            ..Self::default()
        }
    }
}
