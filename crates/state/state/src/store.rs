use async_trait::async_trait;

use crate::entry::{CooldownEntry, EscalationEntry};
use crate::error::StateError;

/// Persistence contract required by the notification engine.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Writes are per-key upserts; reads list all entries of a type. Payloads
/// are plain JSON-safe mappings with dates as ISO strings on the wire.
///
/// A stored escalation row that no longer parses must be deleted by the
/// implementation rather than surfaced on every listing, so recovery never
/// retries a poison entry indefinitely.
#[async_trait]
pub trait NotificationStateStore: Send + Sync {
    /// Upsert the last-dispatch instant for a rule.
    async fn save_cooldown(&self, rule_id: &str, epoch_ms: i64) -> Result<(), StateError>;

    /// List every cooldown row.
    async fn list_cooldowns(&self) -> Result<Vec<CooldownEntry>, StateError>;

    /// Delete a cooldown row. Returns `true` if it existed.
    async fn delete_cooldown(&self, rule_id: &str) -> Result<bool, StateError>;

    /// Idempotently upsert an escalation entry by `entry.id`.
    async fn save_escalation(&self, entry: &EscalationEntry) -> Result<(), StateError>;

    /// List every escalation entry that still parses.
    async fn list_escalations(&self) -> Result<Vec<EscalationEntry>, StateError>;

    /// Delete an escalation entry. Returns `true` if it existed.
    async fn delete_escalation(&self, alert_id: &str) -> Result<bool, StateError>;

    /// Remove all state. Tests require a full reset between runs.
    async fn clear_all(&self) -> Result<(), StateError>;
}
