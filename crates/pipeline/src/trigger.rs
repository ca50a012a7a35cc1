use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use faultline_core::{
    AlertLinks, AlertPayload, AlertRule, ErrorEvent, Issue, Occurrence, Project, RuleKind,
    Severity,
};
use faultline_notify::NotificationEngine;
use faultline_rules::{Evaluation, RuleMetrics, TriggerReason, evaluate};
use faultline_storage::{OccurrenceStore, RuleStore};

use crate::enrich::ContextEnricher;

/// Link-building configuration.
#[derive(Debug, Clone, Default)]
pub struct TriggerConfig {
    /// Dashboard base URL for error links.
    pub dashboard_base_url: Option<String>,
    /// API base URL for acknowledge links.
    pub api_base_url: Option<String>,
}

/// What one trigger pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerReport {
    pub evaluated: usize,
    pub triggered: usize,
    pub skipped: usize,
}

/// Evaluates a fresh occurrence against the project's rules and hands
/// fired alerts to the notification engine.
pub struct TriggerPipeline {
    rules: Arc<dyn RuleStore>,
    occurrences: Arc<dyn OccurrenceStore>,
    enricher: ContextEnricher,
    engine: NotificationEngine,
    config: TriggerConfig,
}

impl std::fmt::Debug for TriggerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TriggerPipeline {
    /// Create a pipeline.
    pub fn new(
        rules: Arc<dyn RuleStore>,
        occurrences: Arc<dyn OccurrenceStore>,
        enricher: ContextEnricher,
        engine: NotificationEngine,
        config: TriggerConfig,
    ) -> Self {
        Self {
            rules,
            occurrences,
            enricher,
            engine,
            config,
        }
    }

    /// Evaluate every enabled rule for this occurrence. Rules are
    /// independent: one rule's failure is logged and the rest proceed.
    #[instrument(skip_all, fields(project_id = %project.id, issue_id = %issue.id, is_new))]
    pub async fn evaluate_and_dispatch(
        &self,
        project: &Project,
        issue: &Issue,
        occurrence: &Occurrence,
        is_new: bool,
        event: &ErrorEvent,
    ) -> TriggerReport {
        let rules = match self.rules.list_enabled(&project.id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "loading rules failed, skipping trigger pass");
                return TriggerReport::default();
            }
        };

        let base = base_metrics(issue, occurrence, is_new, event);
        let mut report = TriggerReport::default();

        for rule in rules {
            report.evaluated += 1;

            if rule.kind.needs_windowed_counts() && base.fingerprint.is_none() {
                debug!(rule_id = %rule.id, "rule needs occurrence counts but the event has no fingerprint, skipping");
                report.skipped += 1;
                continue;
            }

            let metrics = match self.windowed_metrics(project, &rule, &base).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "metrics collection failed, skipping rule");
                    report.skipped += 1;
                    continue;
                }
            };

            let evaluation = evaluate(&rule, &metrics);
            if !evaluation.triggered {
                continue;
            }
            let Some(reason) = evaluation.reason else {
                continue;
            };

            let mut alert = build_payload(project, &rule, issue, &metrics, &evaluation, reason);
            self.apply_links(project, issue, &mut alert);
            self.enricher
                .enrich(project, &mut alert, &rule.kind, reason)
                .await;

            match self
                .engine
                .process_triggered_alert(project, &rule, alert)
                .await
            {
                Ok(()) => report.triggered += 1,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "notification engine rejected alert");
                }
            }
        }

        report
    }

    /// Extend the base metrics with windowed counts when the rule needs
    /// them.
    async fn windowed_metrics(
        &self,
        project: &Project,
        rule: &AlertRule,
        base: &RuleMetrics,
    ) -> Result<RuleMetrics, faultline_storage::StorageError> {
        let mut metrics = base.clone();

        let (window_minutes, baseline_minutes) = match rule.kind {
            RuleKind::Threshold { window_minutes, .. } => (Some(window_minutes), None),
            RuleKind::Spike {
                window_minutes,
                baseline_minutes,
                ..
            } => (Some(window_minutes), Some(baseline_minutes)),
            RuleKind::NewError | RuleKind::Critical { .. } => (None, None),
        };

        let Some(window_minutes) = window_minutes else {
            return Ok(metrics);
        };
        let Some(fingerprint) = base.fingerprint.as_deref() else {
            return Ok(metrics);
        };

        // Rules scoped to specific environments count within the event's
        // environment; unscoped rules count across all of them.
        let environment = if rule.environments.is_empty() {
            None
        } else {
            base.environment.as_deref()
        };

        let now = Utc::now();
        let window_start = now - Duration::milliseconds((window_minutes * 60_000.0) as i64);
        let window_count = self
            .occurrences
            .count_range(&project.id, fingerprint, environment, window_start, now, true)
            .await?;

        metrics.window_start = Some(window_start);
        metrics.window_minutes = Some(window_minutes);
        metrics.window_count = Some(window_count);

        if let Some(baseline_minutes) = baseline_minutes {
            let baseline_start =
                window_start - Duration::milliseconds((baseline_minutes * 60_000.0) as i64);
            let baseline_count = self
                .occurrences
                .count_range(
                    &project.id,
                    fingerprint,
                    environment,
                    baseline_start,
                    window_start,
                    false,
                )
                .await?;
            metrics.baseline_minutes = Some(baseline_minutes);
            metrics.baseline_count = Some(baseline_count);
        }

        Ok(metrics)
    }

    fn apply_links(&self, project: &Project, issue: &Issue, alert: &mut AlertPayload) {
        if let Some(base) = &self.config.dashboard_base_url {
            alert.links.dashboard = Some(format!(
                "{base}/projects/{}/issues/{}",
                project.id, issue.id
            ));
        }
        if let (Some(base), Some(alert_id)) = (&self.config.api_base_url, &alert.id) {
            alert.links.acknowledge =
                Some(format!("{base}/api/alerts/{alert_id}/acknowledge"));
        }
    }
}

/// The per-occurrence metrics every rule sees.
fn base_metrics(
    issue: &Issue,
    occurrence: &Occurrence,
    is_new: bool,
    event: &ErrorEvent,
) -> RuleMetrics {
    let fingerprint = (!issue.fingerprint.is_empty()).then(|| issue.fingerprint.clone());
    let file = event.first_frame_file().map(str::to_owned);

    RuleMetrics {
        environment: Some(occurrence.environment.clone()),
        severity: extract_severity(event),
        fingerprint,
        is_new,
        file: file.clone(),
        source_file: file,
        user_segments: collect_user_segments(event),
        ..RuleMetrics::default()
    }
}

/// Severity from event metadata or context, when a client supplied one.
fn extract_severity(event: &ErrorEvent) -> Option<Severity> {
    for source in [event.metadata.as_ref(), event.context.as_ref()] {
        if let Some(value) = source
            .and_then(|v| v.get("severity"))
            .and_then(Value::as_str)
            && let Some(severity) = Severity::parse(value)
        {
            return Some(severity);
        }
    }
    None
}

/// User segments from the user context (`segment`/`plan`/`tier`) and
/// metadata (`userSegment`/`user_segment`), deduplicated in order.
fn collect_user_segments(event: &ErrorEvent) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut push = |value: Option<&Value>| {
        if let Some(text) = value.and_then(Value::as_str)
            && !text.is_empty()
            && !segments.iter().any(|s| s == text)
        {
            segments.push(text.to_owned());
        }
    };

    if let Some(user) = &event.user_context {
        for key in ["segment", "plan", "tier"] {
            push(user.get(key));
        }
    }
    if let Some(metadata) = &event.metadata {
        for key in ["userSegment", "user_segment"] {
            push(metadata.get(key));
        }
    }

    segments
}

/// Build the alert payload for a fired rule.
fn build_payload(
    project: &Project,
    rule: &AlertRule,
    issue: &Issue,
    metrics: &RuleMetrics,
    evaluation: &Evaluation,
    reason: TriggerReason,
) -> AlertPayload {
    let severity = metrics.severity.unwrap_or(match reason {
        TriggerReason::ThresholdExceeded | TriggerReason::SpikeDetected => Severity::High,
        TriggerReason::NewError => Severity::Medium,
        TriggerReason::CriticalSeverity | TriggerReason::CriticalFingerprint => Severity::Critical,
    });

    let summary = match (reason, &rule.kind) {
        (TriggerReason::ThresholdExceeded, RuleKind::Threshold { threshold, window_minutes }) => {
            format!(
                "Detected {} occurrences in the last {} minutes (threshold {threshold}).",
                metrics.window_count.unwrap_or(0),
                format_minutes(*window_minutes),
            )
        }
        (TriggerReason::SpikeDetected, _) => {
            let increase = evaluation
                .context
                .get("increasePercent")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            format!(
                "Error rate increased by {}% compared to baseline.",
                round1(increase)
            )
        }
        (TriggerReason::NewError, _) => {
            format!("New fingerprint detected in {}.", occurrence_env(metrics))
        }
        (TriggerReason::CriticalSeverity, _) => {
            format!("Critical alert triggered: severity {severity}.")
        }
        (TriggerReason::CriticalFingerprint, _) => format!(
            "Critical alert triggered: watched fingerprint {}.",
            metrics.fingerprint.as_deref().unwrap_or("")
        ),
        // Threshold reason always comes from a threshold rule.
        (TriggerReason::ThresholdExceeded, _) => "Threshold exceeded.".to_owned(),
    };

    let mut alert = AlertPayload::new(
        format!("{}: {}", rule.name, clip(&issue.message, 120)),
        summary,
        severity,
        occurrence_env(metrics).into(),
        issue.last_seen,
    );
    alert.id = Some(uuid::Uuid::new_v4().simple().to_string());
    alert.occurrences = metrics.window_count.unwrap_or(issue.count);
    alert.affected_users = u64::from(!metrics.user_segments.is_empty());
    alert.fingerprint = metrics.fingerprint.clone();
    alert.first_detected_at = issue.first_seen;
    alert.last_detected_at = issue.last_seen;

    alert.set_meta("projectId", project.id.to_string());
    alert.set_meta("ruleId", rule.id.to_string());
    alert.set_meta("ruleType", rule.kind.as_str());
    alert.set_meta("reason", reason.as_str());
    if let Some(source_file) = &metrics.source_file {
        alert.set_meta("sourceFile", source_file.clone());
    }
    if !metrics.user_segments.is_empty() {
        alert.set_meta(
            "userSegments",
            Value::Array(
                metrics
                    .user_segments
                    .iter()
                    .map(|s| Value::String(s.clone()))
                    .collect(),
            ),
        );
    }
    for (key, value) in &evaluation.context {
        alert.metadata.entry(key.clone()).or_insert(value.clone());
    }

    alert
}

fn occurrence_env(metrics: &RuleMetrics) -> &str {
    metrics.environment.as_deref().unwrap_or("production")
}

fn format_minutes(minutes: f64) -> String {
    if (minutes.fract()).abs() < f64::EPSILON {
        format!("{}", minutes as i64)
    } else {
        format!("{minutes}")
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let mut clipped: String = text.chars().take(max).collect();
        clipped.push('\u{2026}');
        clipped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use faultline_core::{ChannelKind, ChannelTarget, ProjectId, RuleId};
    use faultline_dispatch::ChannelDispatcher;
    use faultline_notify::NotifyConfig;
    use faultline_provider::{
        ChannelProvider, ChannelRegistry, NotificationContext, ProviderError, ProviderResponse,
    };
    use faultline_state_memory::MemoryStateStore;
    use faultline_storage::{
        IssueStore, MemoryDeploymentStore, MemoryIssueStore, MemoryOccurrenceStore,
        MemoryRuleStore,
    };

    use super::*;

    struct CapturingChannel {
        calls: Arc<Mutex<Vec<AlertPayload>>>,
    }

    #[async_trait]
    impl ChannelProvider for CapturingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn notify(
            &self,
            context: &NotificationContext,
            _target: &str,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().push(context.alert.clone());
            Ok(ProviderResponse::success(serde_json::json!({"ok": true})))
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct Harness {
        pipeline: TriggerPipeline,
        rules: Arc<MemoryRuleStore>,
        occurrences: Arc<MemoryOccurrenceStore>,
        issues: Arc<MemoryIssueStore>,
        calls: Arc<Mutex<Vec<AlertPayload>>>,
    }

    fn harness() -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(CapturingChannel {
            calls: Arc::clone(&calls),
        }));
        let engine = NotificationEngine::new(
            NotifyConfig::default()
                .with_aggregation_window(StdDuration::ZERO)
                .with_default_cooldown_minutes(0),
            Arc::new(ChannelDispatcher::new(registry)),
            Arc::new(MemoryStateStore::new()),
        );

        let rules = Arc::new(MemoryRuleStore::new());
        let occurrences = Arc::new(MemoryOccurrenceStore::new());
        let issues = Arc::new(MemoryIssueStore::new());
        let enricher = ContextEnricher::new(Arc::new(MemoryDeploymentStore::new()), issues.clone());

        let pipeline = TriggerPipeline::new(
            rules.clone(),
            occurrences.clone(),
            enricher,
            engine,
            TriggerConfig {
                dashboard_base_url: Some("https://dash".into()),
                api_base_url: Some("https://api".into()),
            },
        );
        Harness {
            pipeline,
            rules,
            occurrences,
            issues,
            calls,
        }
    }

    fn rule(id: &str, kind: RuleKind) -> AlertRule {
        AlertRule {
            id: RuleId::new(id),
            project_id: ProjectId::new("p1"),
            name: "API errors".into(),
            kind,
            environments: Vec::new(),
            filter: None,
            channels: vec![ChannelTarget::new(ChannelKind::Webhook, "https://h/x")],
            cooldown_minutes: Some(0),
            enabled: true,
            escalation: None,
        }
    }

    async fn seed_issue(h: &Harness, fingerprint: &str, occurrences: usize) -> (Issue, Occurrence) {
        let now = Utc::now();
        let issue = h
            .issues
            .insert(Issue::new(
                ProjectId::new("p1"),
                fingerprint,
                "boom",
                "production",
                Vec::new(),
                now,
            ))
            .await
            .unwrap();
        let mut last = Occurrence::new(&issue, now);
        for i in 0..occurrences {
            let occ = Occurrence::new(&issue, now - Duration::seconds(i as i64 * 30));
            last = occ.clone();
            h.occurrences.append(occ).await.unwrap();
        }
        (issue, last)
    }

    #[tokio::test]
    async fn threshold_rule_dispatches_with_reason_summary() {
        let h = harness();
        h.rules.upsert(rule(
            "r1",
            RuleKind::Threshold {
                threshold: 2,
                window_minutes: 5.0,
            },
        ));
        let project = Project::new("p1", "Checkout", "k", "s");
        let (issue, occurrence) = seed_issue(&h, "fp1", 2).await;

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, false, &ErrorEvent::new("boom"))
            .await;

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.triggered, 1);
        let calls = h.calls.lock();
        assert_eq!(calls.len(), 1);
        let alert = &calls[0];
        assert_eq!(alert.meta_str("reason"), Some("threshold_exceeded"));
        assert!(
            alert
                .summary
                .contains("2 occurrences in the last 5 minutes (threshold 2)"),
            "summary was {:?}",
            alert.summary
        );
        assert!(
            alert
                .links
                .dashboard
                .as_deref()
                .unwrap()
                .starts_with("https://dash/projects/p1/issues/")
        );
        assert!(
            alert
                .links
                .acknowledge
                .as_deref()
                .unwrap()
                .contains("/api/alerts/")
        );
        assert!(alert.context.why_it_matters.is_some());
    }

    #[tokio::test]
    async fn one_below_threshold_does_not_dispatch() {
        let h = harness();
        h.rules.upsert(rule(
            "r1",
            RuleKind::Threshold {
                threshold: 3,
                window_minutes: 5.0,
            },
        ));
        let project = Project::new("p1", "Checkout", "k", "s");
        let (issue, occurrence) = seed_issue(&h, "fp1", 2).await;

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, false, &ErrorEvent::new("boom"))
            .await;

        assert_eq!(report.triggered, 0);
        assert!(h.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn spike_rule_without_fingerprint_is_skipped() {
        let h = harness();
        h.rules.upsert(rule(
            "r1",
            RuleKind::Spike {
                increase_percent: 200.0,
                window_minutes: 5.0,
                baseline_minutes: 15.0,
            },
        ));
        let project = Project::new("p1", "Checkout", "k", "s");
        let now = Utc::now();
        // An issue whose fingerprint is empty models an event that could
        // not be fingerprinted.
        let issue = Issue::new(
            ProjectId::new("p1"),
            "",
            "boom",
            "production",
            Vec::new(),
            now,
        );
        let occurrence = Occurrence::new(&issue, now);

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, false, &ErrorEvent::new("boom"))
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.triggered, 0);
        assert!(h.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn new_error_rule_fires_only_for_new_issues() {
        let h = harness();
        h.rules.upsert(rule("r1", RuleKind::NewError));
        let project = Project::new("p1", "Checkout", "k", "s");
        let (issue, occurrence) = seed_issue(&h, "fp1", 1).await;

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, true, &ErrorEvent::new("boom"))
            .await;
        assert_eq!(report.triggered, 1);
        assert!(
            h.calls.lock()[0]
                .summary
                .contains("New fingerprint detected in production")
        );

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, false, &ErrorEvent::new("boom"))
            .await;
        assert_eq!(report.triggered, 0);
    }

    #[tokio::test]
    async fn one_bad_rule_does_not_stop_others() {
        let h = harness();
        // r1 targets an unregistered channel kind: its dispatch fails
        // whole-sale inside the engine.
        let mut broken = rule("r1", RuleKind::NewError);
        broken.channels = vec![ChannelTarget::new(ChannelKind::Teams, "https://t")];
        h.rules.upsert(broken);
        h.rules.upsert(rule("r2", RuleKind::NewError));

        let project = Project::new("p1", "Checkout", "k", "s");
        let (issue, occurrence) = seed_issue(&h, "fp1", 1).await;

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, true, &ErrorEvent::new("boom"))
            .await;

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.triggered, 1, "the healthy rule still dispatched");
        assert_eq!(h.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn critical_rule_uses_event_severity() {
        let h = harness();
        h.rules.upsert(rule(
            "r1",
            RuleKind::Critical {
                severity: Some(Severity::Critical),
                fingerprints: Vec::new(),
            },
        ));
        let project = Project::new("p1", "Checkout", "k", "s");
        let (issue, occurrence) = seed_issue(&h, "fp1", 1).await;
        let event = ErrorEvent {
            metadata: Some(serde_json::json!({"severity": "critical"})),
            ..ErrorEvent::new("boom")
        };

        let report = h
            .pipeline
            .evaluate_and_dispatch(&project, &issue, &occurrence, false, &event)
            .await;

        assert_eq!(report.triggered, 1);
        let calls = h.calls.lock();
        assert_eq!(calls[0].severity, Severity::Critical);
        assert_eq!(calls[0].meta_str("reason"), Some("critical_severity"));
    }

    #[test]
    fn user_segments_are_collected_and_deduplicated() {
        let event = ErrorEvent {
            user_context: Some(serde_json::json!({
                "segment": "enterprise",
                "plan": "pro",
                "tier": "enterprise",
            })),
            metadata: Some(serde_json::json!({"userSegment": "beta"})),
            ..ErrorEvent::new("boom")
        };
        assert_eq!(
            collect_user_segments(&event),
            vec!["enterprise", "pro", "beta"]
        );
    }
}
