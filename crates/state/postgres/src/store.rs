use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

use faultline_state::{CooldownEntry, EscalationEntry, NotificationStateStore, StateError};

use crate::config::PostgresConfig;
use crate::migrations;

/// PostgreSQL-backed [`NotificationStateStore`].
///
/// Cooldowns live in a two-column table keyed by rule id; escalation
/// entries are stored as serialized JSON documents keyed by alert id, so
/// the payload round-trips exactly as written.
pub struct PostgresStateStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresStateStore {
    /// Connect, build the pool, and run migrations.
    pub async fn new(config: PostgresConfig) -> Result<Self, StateError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Build a store from an existing pool. Runs migrations on creation.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StateError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(Self { pool, config })
    }
}

#[async_trait]
impl NotificationStateStore for PostgresStateStore {
    async fn save_cooldown(&self, rule_id: &str, epoch_ms: i64) -> Result<(), StateError> {
        let table = self.config.cooldowns_table();
        let query = format!(
            "INSERT INTO {table} (key, timestamp_ms) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET timestamp_ms = EXCLUDED.timestamp_ms"
        );
        sqlx::query(&query)
            .bind(rule_id)
            .bind(epoch_ms)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_cooldowns(&self) -> Result<Vec<CooldownEntry>, StateError> {
        let table = self.config.cooldowns_table();
        let query = format!("SELECT key, timestamp_ms FROM {table}");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| CooldownEntry {
                key: row.get("key"),
                timestamp_ms: row.get("timestamp_ms"),
            })
            .collect())
    }

    async fn delete_cooldown(&self, rule_id: &str) -> Result<bool, StateError> {
        let table = self.config.cooldowns_table();
        let query = format!("DELETE FROM {table} WHERE key = $1");
        let result = sqlx::query(&query)
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_escalation(&self, entry: &EscalationEntry) -> Result<(), StateError> {
        let table = self.config.escalations_table();
        let document = serde_json::to_string(entry)?;
        let query = format!(
            "INSERT INTO {table} (id, entry) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET entry = EXCLUDED.entry"
        );
        sqlx::query(&query)
            .bind(&entry.id)
            .bind(document)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_escalations(&self) -> Result<Vec<EscalationEntry>, StateError> {
        let table = self.config.escalations_table();
        let query = format!("SELECT id, entry FROM {table}");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        let mut entries = Vec::new();
        let mut poison: Vec<String> = Vec::new();

        for row in rows {
            let id: String = row.get("id");
            let document: String = row.get("entry");
            match serde_json::from_str::<EscalationEntry>(&document) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(id = %id, error = %e, "dropping malformed escalation entry");
                    poison.push(id);
                }
            }
        }

        for id in poison {
            if let Err(e) = self.delete_escalation(&id).await {
                warn!(id = %id, error = %e, "failed to delete malformed escalation entry");
            }
        }

        Ok(entries)
    }

    async fn delete_escalation(&self, alert_id: &str) -> Result<bool, StateError> {
        let table = self.config.escalations_table();
        let query = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(alert_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_all(&self) -> Result<(), StateError> {
        for table in [
            self.config.cooldowns_table(),
            self.config.escalations_table(),
        ] {
            let query = format!("DELETE FROM {table}");
            sqlx::query(&query)
                .execute(&self.pool)
                .await
                .map_err(|e| StateError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}
