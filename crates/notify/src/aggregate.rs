//! Aggregated-alert derivation.

use chrono::{DateTime, Utc};
use serde_json::json;

use faultline_core::{AlertPayload, AlertRule, Environments};

/// How many snapshots the aggregation block samples.
const SAMPLE_SIZE: usize = 10;

/// Derive the alert dispatched for a flushed bucket.
///
/// A single snapshot passes through with an `aggregation` marker; several
/// snapshots collapse into one summary alert: highest severity, union of
/// environments, summed counters, min/max detection instants, and a
/// sample of the first ten snapshots.
#[must_use]
pub fn aggregate_alerts(
    rule: &AlertRule,
    snapshots: &[AlertPayload],
    window_minutes: f64,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> AlertPayload {
    let aggregation_frame = |aggregated: bool, count: usize| {
        json!({
            "aggregated": aggregated,
            "count": count,
            "windowMinutes": window_minutes,
            "startedAt": started_at.to_rfc3339(),
            "endedAt": ended_at.to_rfc3339(),
        })
    };

    if snapshots.len() == 1 {
        let mut alert = snapshots[0].clone();
        alert.set_meta("aggregation", aggregation_frame(false, 1));
        return alert;
    }

    let first = &snapshots[0];
    let severity = snapshots
        .iter()
        .map(|a| a.severity)
        .max()
        .unwrap_or(first.severity);
    let environment = Environments::union(snapshots.iter().map(|a| &a.environment));
    let occurrences = snapshots.iter().map(|a| a.occurrences).sum();
    let affected_users = snapshots.iter().map(|a| a.affected_users).sum();
    let first_detected_at = snapshots
        .iter()
        .map(|a| a.first_detected_at)
        .min()
        .unwrap_or(started_at);
    let last_detected_at = snapshots
        .iter()
        .map(|a| a.last_detected_at)
        .max()
        .unwrap_or(ended_at);

    // The shared fingerprint survives aggregation; mixed buckets drop it.
    let fingerprint = first.fingerprint.as_ref().and_then(|fp| {
        snapshots
            .iter()
            .all(|a| a.fingerprint.as_deref() == Some(fp))
            .then(|| fp.clone())
    });

    let sample: Vec<serde_json::Value> = snapshots
        .iter()
        .take(SAMPLE_SIZE)
        .map(|a| {
            json!({
                "id": a.id,
                "title": a.title,
                "severity": a.severity,
                "environment": a.environment,
                "occurrences": a.occurrences,
                "lastDetectedAt": a.last_detected_at.to_rfc3339(),
            })
        })
        .collect();

    let mut metadata = first.metadata.clone();
    metadata.insert(
        "aggregation".into(),
        json!({
            "aggregated": true,
            "count": snapshots.len(),
            "windowMinutes": window_minutes,
            "startedAt": started_at.to_rfc3339(),
            "endedAt": ended_at.to_rfc3339(),
            "sample": sample,
        }),
    );

    AlertPayload {
        id: Some(format!(
            "agg-{}-{}",
            rule.id,
            ended_at.timestamp_millis()
        )),
        title: format!("{} alerts triggered for {}", snapshots.len(), rule.name),
        summary: format!(
            "{} alerts between {} and {}.",
            snapshots.len(),
            started_at.to_rfc3339(),
            ended_at.to_rfc3339()
        ),
        severity,
        environment,
        occurrences,
        affected_users,
        fingerprint,
        first_detected_at,
        last_detected_at,
        metadata,
        links: first.links.clone(),
        context: first.context.clone(),
    }
}
