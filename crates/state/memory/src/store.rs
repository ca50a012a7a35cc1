use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use faultline_state::{CooldownEntry, EscalationEntry, NotificationStateStore, StateError};

/// In-memory [`NotificationStateStore`] backed by [`DashMap`]s.
///
/// Escalation entries are stored as serialized JSON so the round-trip
/// behaviour matches the document-store backend exactly. This
/// implementation is fully synchronous internally; the async trait
/// methods return immediately.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    cooldowns: DashMap<String, i64>,
    escalations: DashMap<String, String>,
}

impl MemoryStateStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStateStore for MemoryStateStore {
    async fn save_cooldown(&self, rule_id: &str, epoch_ms: i64) -> Result<(), StateError> {
        self.cooldowns.insert(rule_id.to_owned(), epoch_ms);
        Ok(())
    }

    async fn list_cooldowns(&self) -> Result<Vec<CooldownEntry>, StateError> {
        Ok(self
            .cooldowns
            .iter()
            .map(|entry| CooldownEntry {
                key: entry.key().clone(),
                timestamp_ms: *entry.value(),
            })
            .collect())
    }

    async fn delete_cooldown(&self, rule_id: &str) -> Result<bool, StateError> {
        Ok(self.cooldowns.remove(rule_id).is_some())
    }

    async fn save_escalation(&self, entry: &EscalationEntry) -> Result<(), StateError> {
        let json = serde_json::to_string(entry)?;
        self.escalations.insert(entry.id.clone(), json);
        Ok(())
    }

    async fn list_escalations(&self) -> Result<Vec<EscalationEntry>, StateError> {
        let mut entries = Vec::new();
        let mut poison = Vec::new();

        for stored in &self.escalations {
            match serde_json::from_str::<EscalationEntry>(stored.value()) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(id = %stored.key(), error = %e, "dropping malformed escalation entry");
                    poison.push(stored.key().clone());
                }
            }
        }

        for id in poison {
            self.escalations.remove(&id);
        }

        Ok(entries)
    }

    async fn delete_escalation(&self, alert_id: &str) -> Result<bool, StateError> {
        Ok(self.escalations.remove(alert_id).is_some())
    }

    async fn clear_all(&self) -> Result<(), StateError> {
        self.cooldowns.clear();
        self.escalations.clear();
        Ok(())
    }
}
