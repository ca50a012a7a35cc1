use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use faultline_core::{AlertRule, RuleId, RuleKind};

use crate::filter::evaluate_filter;
use crate::metrics::RuleMetrics;

/// Why a rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    ThresholdExceeded,
    SpikeDetected,
    NewError,
    CriticalSeverity,
    CriticalFingerprint,
}

impl TriggerReason {
    /// The snake_case reason code carried in alert metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdExceeded => "threshold_exceeded",
            Self::SpikeDetected => "spike_detected",
            Self::NewError => "new_error",
            Self::CriticalSeverity => "critical_severity",
            Self::CriticalFingerprint => "critical_fingerprint",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one rule against one metrics block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub rule_id: RuleId,
    pub triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TriggerReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u32>,
    /// Numeric details backing the decision (counts, rates, ...).
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Evaluation {
    fn not_triggered(rule: &AlertRule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            triggered: false,
            reason: None,
            cooldown_minutes: rule.cooldown_minutes,
            context: Map::new(),
        }
    }

    fn triggered(rule: &AlertRule, reason: TriggerReason, context: Map<String, Value>) -> Self {
        Self {
            rule_id: rule.id.clone(),
            triggered: true,
            reason: Some(reason),
            cooldown_minutes: rule.cooldown_minutes,
            context,
        }
    }
}

/// Slack in the measured window before a threshold rule stops trusting the
/// count: the counting query may land a few seconds past the configured
/// window.
const WINDOW_TOLERANCE_MINUTES: f64 = 0.5;

/// Evaluate a rule against a metrics block. Pure: no I/O, no clocks.
#[must_use]
pub fn evaluate(rule: &AlertRule, metrics: &RuleMetrics) -> Evaluation {
    if !rule.enabled {
        return Evaluation::not_triggered(rule);
    }

    if !environment_allowed(rule, metrics) {
        return Evaluation::not_triggered(rule);
    }

    if let Some(filter) = &rule.filter
        && !evaluate_filter(filter, metrics)
    {
        return Evaluation::not_triggered(rule);
    }

    match &rule.kind {
        RuleKind::Threshold {
            threshold,
            window_minutes,
        } => evaluate_threshold(rule, metrics, *threshold, *window_minutes),
        RuleKind::Spike {
            increase_percent,
            window_minutes,
            baseline_minutes,
        } => evaluate_spike(
            rule,
            metrics,
            *increase_percent,
            *window_minutes,
            *baseline_minutes,
        ),
        RuleKind::NewError => {
            if metrics.is_new {
                Evaluation::triggered(rule, TriggerReason::NewError, Map::new())
            } else {
                Evaluation::not_triggered(rule)
            }
        }
        RuleKind::Critical {
            severity,
            fingerprints,
        } => evaluate_critical(rule, metrics, *severity, fingerprints),
    }
}

fn environment_allowed(rule: &AlertRule, metrics: &RuleMetrics) -> bool {
    if rule.environments.is_empty() {
        return true;
    }
    let Some(environment) = metrics.environment.as_deref() else {
        return false;
    };
    let environment = environment.to_lowercase();
    rule.environments
        .iter()
        .any(|allowed| allowed.to_lowercase() == environment)
}

fn evaluate_threshold(
    rule: &AlertRule,
    metrics: &RuleMetrics,
    threshold: u64,
    window_minutes: f64,
) -> Evaluation {
    if threshold == 0 || window_minutes <= 0.0 || !window_minutes.is_finite() {
        return Evaluation::not_triggered(rule);
    }

    let window_count = metrics.window_count.unwrap_or(0);
    let measured_minutes = metrics.window_minutes.unwrap_or(window_minutes);

    let mut context = Map::new();
    context.insert("windowCount".into(), window_count.into());
    context.insert("windowMinutes".into(), measured_minutes.into());
    context.insert("threshold".into(), threshold.into());

    if window_count >= threshold && measured_minutes <= window_minutes + WINDOW_TOLERANCE_MINUTES {
        Evaluation::triggered(rule, TriggerReason::ThresholdExceeded, context)
    } else {
        Evaluation::not_triggered(rule)
    }
}

#[allow(clippy::cast_precision_loss)]
fn evaluate_spike(
    rule: &AlertRule,
    metrics: &RuleMetrics,
    increase_percent: f64,
    window_minutes: f64,
    baseline_minutes: f64,
) -> Evaluation {
    if increase_percent <= 0.0
        || !increase_percent.is_finite()
        || window_minutes <= 0.0
        || baseline_minutes <= 0.0
    {
        return Evaluation::not_triggered(rule);
    }

    let window_count = metrics.window_count.unwrap_or(0) as f64;
    let baseline_count = metrics.baseline_count.unwrap_or(0) as f64;
    let measured_window = metrics.window_minutes.unwrap_or(window_minutes);
    let measured_baseline = metrics.baseline_minutes.unwrap_or(baseline_minutes);

    if measured_window <= 0.0 || measured_baseline <= 0.0 {
        return Evaluation::not_triggered(rule);
    }

    let current_rate = window_count / measured_window;
    let baseline_rate = baseline_count / measured_baseline;

    // A zero baseline never spikes, no matter how large the window count.
    if current_rate <= 0.0 || baseline_rate <= 0.0 {
        return Evaluation::not_triggered(rule);
    }

    let increase = ((current_rate - baseline_rate) / baseline_rate) * 100.0;

    let mut context = Map::new();
    context.insert("currentRate".into(), current_rate.into());
    context.insert("baselineRate".into(), baseline_rate.into());
    context.insert("increasePercent".into(), increase.into());

    if increase.is_finite() && increase >= increase_percent {
        Evaluation::triggered(rule, TriggerReason::SpikeDetected, context)
    } else {
        Evaluation::not_triggered(rule)
    }
}

fn evaluate_critical(
    rule: &AlertRule,
    metrics: &RuleMetrics,
    severity: Option<faultline_core::Severity>,
    fingerprints: &[String],
) -> Evaluation {
    if let (Some(wanted), Some(actual)) = (severity, metrics.severity)
        && wanted == actual
    {
        let mut context = Map::new();
        context.insert("severity".into(), actual.as_str().into());
        return Evaluation::triggered(rule, TriggerReason::CriticalSeverity, context);
    }

    if let Some(fingerprint) = metrics.fingerprint.as_deref()
        && fingerprints.iter().any(|fp| fp == fingerprint)
    {
        let mut context = Map::new();
        context.insert("fingerprint".into(), fingerprint.into());
        return Evaluation::triggered(rule, TriggerReason::CriticalFingerprint, context);
    }

    Evaluation::not_triggered(rule)
}
