use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use faultline_core::{AlertPayload, AlertRule, ChannelTarget, Project, Severity};
use faultline_dispatch::ChannelDispatcher;
use faultline_state::{EscalationEntry, EscalationLevel, NotificationStateStore};

use crate::aggregate::aggregate_alerts;
use crate::config::NotifyConfig;
use crate::error::NotifyError;

/// Smallest timer the engine arms. Past-due work still leaves the calling
/// path before it runs.
const MIN_TIMER: Duration = Duration::from_millis(10);

/// Smallest escalation delay, in minutes.
const MIN_ESCALATION_MINUTES: f64 = 0.01;

/// Shortest retry delay after a failed flush.
const FLUSH_RETRY_FLOOR: Duration = Duration::from_secs(1);

/// One per-rule aggregation bucket.
struct Bucket {
    project: Project,
    rule: AlertRule,
    alerts: Vec<AlertPayload>,
    started_at: DateTime<Utc>,
    timer: Option<JoinHandle<()>>,
}

/// An escalation entry plus its armed timer.
struct EscalationRuntime {
    entry: EscalationEntry,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct EngineState {
    cooldowns: HashMap<String, i64>,
    buckets: HashMap<String, Bucket>,
    escalations: HashMap<String, EscalationRuntime>,
}

struct EngineInner {
    config: NotifyConfig,
    dispatcher: Arc<ChannelDispatcher>,
    store: Arc<dyn NotificationStateStore>,
    state: Mutex<EngineState>,
}

/// The notification engine.
///
/// All mutable state (cooldown map, aggregation buckets, escalation
/// entries) lives behind one mutex; channel dispatch and store writes run
/// outside the critical section on immutable snapshots. Timers hold a
/// `Weak` handle, so dropping the engine cancels pending work.
#[derive(Clone)]
pub struct NotificationEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for NotificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("NotificationEngine")
            .field("buckets", &state.buckets.len())
            .field("escalations", &state.escalations.len())
            .field("cooldowns", &state.cooldowns.len())
            .finish()
    }
}

impl NotificationEngine {
    /// Create an engine. Call [`start`](Self::start) to recover persisted
    /// state before processing alerts.
    #[must_use]
    pub fn new(
        config: NotifyConfig,
        dispatcher: Arc<ChannelDispatcher>,
        store: Arc<dyn NotificationStateStore>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                dispatcher,
                store,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Load cooldowns and pending escalations from the store and re-arm
    /// their timers. Settled or incomplete entries are deleted rather than
    /// retried.
    pub async fn start(&self) {
        let inner = &self.inner;

        match inner.store.list_cooldowns().await {
            Ok(entries) => {
                let mut state = inner.state.lock();
                for entry in entries {
                    state.cooldowns.insert(entry.key, entry.timestamp_ms);
                }
            }
            Err(e) => warn!(error = %e, "cooldown recovery failed, starting cold"),
        }

        let entries = match inner.store.list_escalations().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "escalation recovery failed, starting cold");
                return;
            }
        };

        let now = Utc::now();
        for entry in entries {
            if entry.is_settled() {
                debug!(alert_id = %entry.id, "dropping settled escalation entry");
                let _ = inner.store.delete_escalation(&entry.id).await;
                continue;
            }

            let trigger_at = entry.pending_levels[0].trigger_at;
            let delay = duration_until(trigger_at, now);
            let alert_id = entry.id.clone();
            info!(alert_id = %alert_id, ?delay, "re-armed escalation after restart");

            let timer = arm_escalation_timer(inner, alert_id.clone(), delay);
            inner.state.lock().escalations.insert(
                alert_id,
                EscalationRuntime {
                    entry,
                    timer: Some(timer),
                },
            );
        }
    }

    /// Cancel every armed timer. In-memory state is retained so tests can
    /// inspect it; a fresh engine starts from the store.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        for bucket in state.buckets.values_mut() {
            if let Some(timer) = bucket.timer.take() {
                timer.abort();
            }
        }
        for runtime in state.escalations.values_mut() {
            if let Some(timer) = runtime.timer.take() {
                timer.abort();
            }
        }
    }

    /// Place a triggered alert into its rule's aggregation bucket and
    /// ensure a flush is scheduled. With a zero aggregation window the
    /// bucket flushes inline.
    #[instrument(skip(self, project, rule, alert), fields(rule_id = %rule.id))]
    pub async fn process_triggered_alert(
        &self,
        project: &Project,
        rule: &AlertRule,
        alert: AlertPayload,
    ) -> Result<(), NotifyError> {
        let inner = &self.inner;
        let window = inner.config.aggregation_window;
        let bucket_key = rule.id.to_string();

        let flush_now = {
            let mut state = inner.state.lock();
            let bucket = state
                .buckets
                .entry(bucket_key.clone())
                .or_insert_with(|| Bucket {
                    project: project.clone(),
                    rule: rule.clone(),
                    alerts: Vec::new(),
                    started_at: Utc::now(),
                    timer: None,
                });
            bucket.alerts.push(alert);

            if window.is_zero() {
                true
            } else {
                if bucket.timer.is_none() {
                    bucket.timer = Some(arm_bucket_timer(
                        inner,
                        bucket_key.clone(),
                        window.max(MIN_TIMER),
                    ));
                }
                false
            }
        };

        if flush_now {
            flush_bucket(inner, &bucket_key).await?;
        }
        Ok(())
    }

    /// Flush one bucket immediately. Returns the dispatched alert, or
    /// `None` when the bucket was empty or still cooling down.
    pub async fn flush_bucket(&self, rule_id: &str) -> Result<Option<AlertPayload>, NotifyError> {
        flush_bucket(&self.inner, rule_id).await
    }

    /// Mark an alert acknowledged; pending escalation levels stop firing.
    /// Idempotent. Returns whether an entry was found.
    pub async fn acknowledge(&self, alert_id: &str) -> bool {
        self.settle(alert_id, "acknowledged").await
    }

    /// Mark an alert resolved; pending escalation levels stop firing.
    /// Idempotent. Returns whether an entry was found.
    pub async fn resolve(&self, alert_id: &str) -> bool {
        self.settle(alert_id, "resolved").await
    }

    async fn settle(&self, alert_id: &str, how: &'static str) -> bool {
        let found_in_memory = {
            let mut state = self.inner.state.lock();
            match state.escalations.remove(alert_id) {
                Some(mut runtime) => {
                    if let Some(timer) = runtime.timer.take() {
                        timer.abort();
                    }
                    true
                }
                None => false,
            }
        };

        let deleted = self
            .inner
            .store
            .delete_escalation(alert_id)
            .await
            .unwrap_or_else(|e| {
                warn!(alert_id, error = %e, "deleting escalation entry failed");
                false
            });

        if found_in_memory || deleted {
            info!(alert_id, how, "escalation cancelled");
        }
        found_in_memory || deleted
    }

    /// Number of live aggregation buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.inner.state.lock().buckets.len()
    }

    /// Number of alerts waiting in one bucket.
    #[must_use]
    pub fn bucket_len(&self, rule_id: &str) -> usize {
        self.inner
            .state
            .lock()
            .buckets
            .get(rule_id)
            .map_or(0, |b| b.alerts.len())
    }

    /// Number of pending escalation entries.
    #[must_use]
    pub fn escalation_count(&self) -> usize {
        self.inner.state.lock().escalations.len()
    }

    /// Last dispatch instant recorded for a rule.
    #[must_use]
    pub fn cooldown_for(&self, rule_id: &str) -> Option<i64> {
        self.inner.state.lock().cooldowns.get(rule_id).copied()
    }
}

fn duration_until(instant: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (instant - now).to_std().unwrap_or(Duration::ZERO).max(MIN_TIMER)
}

fn arm_bucket_timer(inner: &Arc<EngineInner>, rule_id: String, delay: Duration) -> JoinHandle<()> {
    let weak: Weak<EngineInner> = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else { return };
        if let Err(e) = flush_bucket(&inner, &rule_id).await {
            warn!(rule_id = %rule_id, error = %e, "timed flush failed, bucket retained");
        }
    })
}

fn arm_escalation_timer(
    inner: &Arc<EngineInner>,
    alert_id: String,
    delay: Duration,
) -> JoinHandle<()> {
    let weak: Weak<EngineInner> = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::time::sleep(delay.max(MIN_TIMER)).await;
        let Some(inner) = weak.upgrade() else { return };
        run_escalation_level(&inner, &alert_id).await;
    })
}

async fn flush_bucket(
    inner: &Arc<EngineInner>,
    rule_id: &str,
) -> Result<Option<AlertPayload>, NotifyError> {
    let window = inner.config.aggregation_window;
    let window_minutes = window.as_secs_f64() / 60.0;
    let now = Utc::now();

    // Phase 1: under the lock, clear the timer, check the cooldown, and
    // snapshot the bucket. The bucket itself stays in place until dispatch
    // succeeds, so a failed flush reconstructs the payload next time.
    let (project, rule, snapshots, flushed_len, started_at) = {
        let mut state = inner.state.lock();

        let cooldown_ms: i64 = {
            let Some(bucket) = state.buckets.get_mut(rule_id) else {
                return Ok(None);
            };
            if let Some(timer) = bucket.timer.take() {
                timer.abort();
            }
            let cooldown_minutes = bucket
                .rule
                .cooldown_minutes
                .unwrap_or(inner.config.default_cooldown_minutes);
            i64::from(cooldown_minutes) * 60_000
        };

        let now_ms = now.timestamp_millis();
        let remaining_ms = state
            .cooldowns
            .get(rule_id)
            .map(|last| cooldown_ms - (now_ms - last))
            .filter(|remaining| *remaining > 0);

        if let Some(remaining_ms) = remaining_ms {
            // Still cooling down: re-arm for whichever is longer, the
            // remaining cooldown or a full aggregation window.
            let delay = Duration::from_millis(remaining_ms as u64).max(window).max(MIN_TIMER);
            debug!(rule_id, ?delay, "flush deferred by cooldown");
            let timer = arm_bucket_timer(inner, rule_id.to_owned(), delay);
            if let Some(bucket) = state.buckets.get_mut(rule_id) {
                bucket.timer = Some(timer);
            }
            return Ok(None);
        }

        let Some(bucket) = state.buckets.get_mut(rule_id) else {
            return Ok(None);
        };
        if bucket.alerts.is_empty() {
            state.buckets.remove(rule_id);
            return Ok(None);
        }
        (
            bucket.project.clone(),
            bucket.rule.clone(),
            bucket.alerts.clone(),
            bucket.alerts.len(),
            bucket.started_at,
        )
    };

    // Phase 2: outside the lock, aggregate and dispatch.
    let aggregated = aggregate_alerts(&rule, &snapshots, window_minutes, started_at, now);

    match dispatch_alert(inner, &project, &rule, aggregated).await {
        Ok(dispatched) => {
            let mut state = inner.state.lock();
            if let Some(bucket) = state.buckets.get_mut(rule_id) {
                // Alerts that arrived during dispatch stay for the next
                // flush; the ones we shipped are gone.
                bucket.alerts.drain(..flushed_len.min(bucket.alerts.len()));
                if bucket.alerts.is_empty() {
                    state.buckets.remove(rule_id);
                } else if bucket.timer.is_none() {
                    let timer = arm_bucket_timer(
                        inner,
                        rule_id.to_owned(),
                        window.max(MIN_TIMER),
                    );
                    bucket.timer = Some(timer);
                }
            }
            Ok(Some(dispatched))
        }
        Err(e) => {
            warn!(rule_id, error = %e, "dispatch failed, re-arming bucket");
            let delay = window.max(FLUSH_RETRY_FLOOR);
            let timer = arm_bucket_timer(inner, rule_id.to_owned(), delay);
            let mut state = inner.state.lock();
            if let Some(bucket) = state.buckets.get_mut(rule_id) {
                bucket.timer = Some(timer);
            } else {
                timer.abort();
            }
            Err(e)
        }
    }
}

async fn dispatch_alert(
    inner: &Arc<EngineInner>,
    project: &Project,
    rule: &AlertRule,
    mut alert: AlertPayload,
) -> Result<AlertPayload, NotifyError> {
    if alert.id.is_none() {
        alert.id = Some(uuid::Uuid::new_v4().simple().to_string());
    }
    let alert_id = alert.id.clone().unwrap_or_default();

    let context = faultline_provider::NotificationContext::new(
        project.clone(),
        rule.clone(),
        alert.clone(),
    );
    let summary = inner.dispatcher.dispatch(&context, &rule.channels).await;
    if summary.all_failed() {
        return Err(NotifyError::AllChannelsFailed {
            rule_id: rule.id.to_string(),
        });
    }
    info!(
        alert_id = %alert_id,
        rule_id = %rule.id,
        delivered = summary.delivered(),
        channels = summary.results.len(),
        "alert dispatched"
    );

    let sent_at = Utc::now();
    let now_ms = sent_at.timestamp_millis();
    inner
        .state
        .lock()
        .cooldowns
        .insert(rule.id.to_string(), now_ms);
    if let Err(e) = inner.store.save_cooldown(rule.id.as_str(), now_ms).await {
        warn!(rule_id = %rule.id, error = %e, "persisting cooldown failed");
    }

    let levels = escalation_levels(rule, sent_at, inner.config.default_escalation_minutes);
    if !levels.is_empty() {
        let entry = EscalationEntry {
            id: alert_id.clone(),
            project: project.clone(),
            rule: rule.clone(),
            alert: alert.clone(),
            sent_at,
            acknowledged: false,
            resolved: false,
            pending_levels: levels,
            current_level: 0,
        };

        // Durability first: the entry is persisted before any timer fires.
        if let Err(e) = inner.store.save_escalation(&entry).await {
            warn!(alert_id = %alert_id, error = %e, "persisting escalation entry failed");
        }

        let delay = duration_until(entry.pending_levels[0].trigger_at, Utc::now());
        let timer = arm_escalation_timer(inner, alert_id.clone(), delay);
        inner.state.lock().escalations.insert(
            alert_id,
            EscalationRuntime {
                entry,
                timer: Some(timer),
            },
        );
    }

    Ok(alert)
}

/// Normalize a rule's escalation policy into concrete levels with absolute
/// firing instants, ascending by delay.
#[must_use]
pub fn escalation_levels(
    rule: &AlertRule,
    sent_at: DateTime<Utc>,
    default_minutes: f64,
) -> Vec<EscalationLevel> {
    let Some(policy) = &rule.escalation else {
        return Vec::new();
    };
    if !policy.enabled {
        return Vec::new();
    }

    let configs: Vec<faultline_core::EscalationLevelConfig> = if policy.levels.is_empty() {
        vec![faultline_core::EscalationLevelConfig {
            name: "Manager escalation".to_owned(),
            after_minutes: default_minutes,
            channels: policy.channels.clone(),
        }]
    } else {
        policy.levels.clone()
    };

    let mut levels: Vec<EscalationLevel> = configs
        .into_iter()
        .map(|config| {
            let after_minutes = config.after_minutes.max(MIN_ESCALATION_MINUTES);
            let channels: Vec<ChannelTarget> = if config.channels.is_empty() {
                policy.channels.clone()
            } else {
                config.channels
            };
            EscalationLevel {
                name: config.name,
                after_minutes,
                channels,
                trigger_at: sent_at
                    + chrono::Duration::milliseconds((after_minutes * 60_000.0) as i64),
            }
        })
        .collect();

    levels.sort_by(|a, b| {
        a.after_minutes
            .partial_cmp(&b.after_minutes)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    levels
}

/// Build the sub-alert dispatched when an escalation level fires.
fn escalation_alert(entry: &EscalationEntry, level: &EscalationLevel) -> AlertPayload {
    let mut alert = entry.alert.clone();
    let original_id = entry.id.clone();
    alert.id = Some(format!("{original_id}-escalation-{}", level.after_minutes));
    alert.title = format!("Escalation: {}", entry.alert.title);
    alert.summary = format!("Alert unresolved for {} minutes.", level.after_minutes);
    alert.severity = Severity::Critical;
    alert.set_meta("escalation", true);
    alert.set_meta("originalAlertId", original_id);
    alert.set_meta("levelName", level.name.clone());
    alert.set_meta("afterMinutes", level.after_minutes);
    alert
}

async fn run_escalation_level(inner: &Arc<EngineInner>, alert_id: &str) {
    // Phase 1: recheck under the lock. A settle that won the race means
    // this firing no-ops.
    let fired = {
        let mut state = inner.state.lock();
        let Some(runtime) = state.escalations.get_mut(alert_id) else {
            return;
        };
        let fired = if runtime.entry.acknowledged || runtime.entry.resolved {
            None
        } else {
            runtime
                .entry
                .pending_levels
                .first()
                .cloned()
                .map(|level| (runtime.entry.clone(), level))
        };
        if fired.is_none() {
            state.escalations.remove(alert_id);
        }
        fired
    };

    let Some((entry, level)) = fired else {
        let _ = inner.store.delete_escalation(alert_id).await;
        return;
    };

    // Phase 2: dispatch the sub-alert to the level's channels.
    let sub_alert = escalation_alert(&entry, &level);
    let context = faultline_provider::NotificationContext::new(
        entry.project.clone(),
        entry.rule.clone(),
        sub_alert,
    );
    let summary = inner.dispatcher.dispatch(&context, &level.channels).await;
    info!(
        alert_id,
        level = %level.name,
        delivered = summary.delivered(),
        "escalation level fired"
    );

    // Phase 3: advance to the next level and persist.
    enum Next {
        Delete,
        Persist(EscalationEntry, DateTime<Utc>),
    }

    let next = {
        let mut state = inner.state.lock();
        let decision = match state.escalations.get_mut(alert_id) {
            None => None,
            Some(runtime) if runtime.entry.acknowledged || runtime.entry.resolved => {
                Some(Next::Delete)
            }
            Some(runtime) => {
                if !runtime.entry.pending_levels.is_empty() {
                    runtime.entry.pending_levels.remove(0);
                }
                runtime.entry.current_level += 1;
                match runtime.entry.pending_levels.first() {
                    Some(next_level) => {
                        Some(Next::Persist(runtime.entry.clone(), next_level.trigger_at))
                    }
                    None => Some(Next::Delete),
                }
            }
        };
        if matches!(decision, Some(Next::Delete)) {
            state.escalations.remove(alert_id);
        }
        decision
    };

    match next {
        Some(Next::Delete) => {
            let _ = inner.store.delete_escalation(alert_id).await;
        }
        Some(Next::Persist(entry, trigger_at)) => {
            if let Err(e) = inner.store.save_escalation(&entry).await {
                warn!(alert_id, error = %e, "persisting escalation progress failed");
            }
            let delay = duration_until(trigger_at, Utc::now());
            let timer = arm_escalation_timer(inner, alert_id.to_owned(), delay);
            let mut state = inner.state.lock();
            match state.escalations.get_mut(alert_id) {
                Some(runtime) if !runtime.entry.acknowledged && !runtime.entry.resolved => {
                    runtime.timer = Some(timer);
                }
                _ => timer.abort(),
            }
        }
        None => {}
    }
}
