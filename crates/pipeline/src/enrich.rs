use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, instrument};

use faultline_core::{AlertPayload, IssueSummary, Project, RuleKind, Severity};
use faultline_rules::TriggerReason;
use faultline_storage::{DeploymentStore, IssueStore};

/// How many deployments and similar incidents an alert carries.
const CONTEXT_LIMIT: usize = 3;

/// Maximum ordered next-step actions.
const MAX_NEXT_STEPS: usize = 5;

/// Builds the contextual-insight block of an alert.
///
/// Everything here is best-effort: a failing lookup leaves the
/// corresponding list empty and never blocks dispatch.
pub struct ContextEnricher {
    deployments: Arc<dyn DeploymentStore>,
    issues: Arc<dyn IssueStore>,
    /// Half-width of the deployment window around the alert instant.
    lookback: Duration,
}

impl std::fmt::Debug for ContextEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEnricher")
            .field("lookback", &self.lookback)
            .finish_non_exhaustive()
    }
}

impl ContextEnricher {
    /// Create an enricher with the default 12-hour deployment lookback.
    pub fn new(deployments: Arc<dyn DeploymentStore>, issues: Arc<dyn IssueStore>) -> Self {
        Self {
            deployments,
            issues,
            lookback: Duration::hours(12),
        }
    }

    /// Override the deployment lookback.
    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Fill the alert's context block in place.
    #[instrument(skip(self, project, alert), fields(project_id = %project.id))]
    pub async fn enrich(
        &self,
        project: &Project,
        alert: &mut AlertPayload,
        rule_kind: &RuleKind,
        reason: TriggerReason,
    ) {
        let reference = alert.last_detected_at;

        alert.context.recent_deployments = self
            .deployments
            .recent(&project.id, reference, self.lookback, CONTEXT_LIMIT)
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "deployment lookup failed, skipping");
                Vec::new()
            });

        let environment = alert.environment.labels().first().map(|s| (*s).to_owned());
        alert.context.similar_incidents = self
            .issues
            .find_similar(
                &project.id,
                alert.fingerprint.as_deref(),
                environment.as_deref(),
                CONTEXT_LIMIT,
            )
            .await
            .map(|issues| {
                issues
                    .into_iter()
                    .map(|issue| IssueSummary {
                        id: issue.id.to_string(),
                        message: issue.message,
                        environment: issue.environment,
                        count: issue.count,
                        last_seen: issue.last_seen,
                    })
                    .collect()
            })
            .unwrap_or_else(|e| {
                debug!(error = %e, "similar-incident lookup failed, skipping");
                Vec::new()
            });

        alert.context.suggested_fixes = suggested_fixes(alert, rule_kind);
        alert.context.why_it_matters = Some(why_it_matters(alert, reason));
        alert.context.next_steps = next_steps(alert, rule_kind);
    }
}

/// Deterministic fix suggestions from rule type, metadata, and deployments.
fn suggested_fixes(alert: &AlertPayload, rule_kind: &RuleKind) -> Vec<String> {
    let mut fixes = Vec::new();

    if let Some(deployment) = alert.context.recent_deployments.first() {
        fixes.push(format!(
            "Review deployment {} from {} for regressions.",
            deployment.version,
            deployment.deployed_at.to_rfc3339()
        ));
    }

    if let Some(source_file) = alert.meta_str("sourceFile") {
        fixes.push(format!("Inspect {source_file} around the failing frames."));
    }

    match rule_kind {
        RuleKind::Threshold { .. } => {
            fixes.push("Check for traffic spikes or retry storms feeding the burst.".to_owned());
        }
        RuleKind::Spike { .. } => {
            fixes.push("Compare the spike window against the baseline for new inputs.".to_owned());
        }
        RuleKind::NewError => {
            fixes.push("Confirm whether the error correlates with the latest release.".to_owned());
        }
        RuleKind::Critical { .. } => {
            fixes.push("Page the owning team for the affected service.".to_owned());
        }
    }

    if let Some(segments) = alert.metadata.get("userSegments").and_then(|v| v.as_array())
        && let Some(first) = segments.first().and_then(|v| v.as_str())
    {
        fixes.push(format!("Verify impact on the {first} segment."));
    }

    fixes
}

/// One sentence on impact, derived from severity, environment, reach and
/// reason.
fn why_it_matters(alert: &AlertPayload, reason: TriggerReason) -> String {
    let environments = alert.environment.labels().join(", ");
    let reach = if alert.affected_users > 0 {
        format!("{} affected users", alert.affected_users)
    } else {
        format!("{} occurrences", alert.occurrences)
    };
    let angle = match reason {
        TriggerReason::ThresholdExceeded => "is recurring above its threshold",
        TriggerReason::SpikeDetected => "is accelerating against its baseline",
        TriggerReason::NewError => "has never been seen before",
        TriggerReason::CriticalSeverity | TriggerReason::CriticalFingerprint => {
            "matches a critical condition"
        }
    };
    format!(
        "A {} severity error in {environments} {angle} with {reach}.",
        alert.severity
    )
}

/// Up to five ordered actions.
fn next_steps(alert: &AlertPayload, rule_kind: &RuleKind) -> Vec<String> {
    let mut steps = vec!["Open the error in the dashboard and read the stack trace.".to_owned()];

    if !alert.context.recent_deployments.is_empty() {
        steps.push("Diff the most recent deployment against the previous release.".to_owned());
    }
    if !alert.context.similar_incidents.is_empty() {
        steps.push("Check how the similar incidents were resolved.".to_owned());
    }

    match rule_kind {
        RuleKind::Threshold { .. } | RuleKind::Spike { .. } => {
            steps.push("Correlate the window with traffic and dependency metrics.".to_owned());
        }
        RuleKind::NewError => {
            steps.push("Reproduce against the commit that introduced the code path.".to_owned());
        }
        RuleKind::Critical { .. } => {
            steps.push("Confirm the on-call owner has acknowledged the alert.".to_owned());
        }
    }

    if alert.severity >= Severity::High {
        steps.push("Consider rolling back if the impact keeps growing.".to_owned());
    }
    steps.push("Acknowledge the alert once mitigation starts.".to_owned());

    steps.truncate(MAX_NEXT_STEPS);
    steps
}
