use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let cooldowns = config.cooldowns_table();
    let escalations = config.escalations_table();

    let create_cooldowns = format!(
        "CREATE TABLE IF NOT EXISTS {cooldowns} (
            key TEXT PRIMARY KEY,
            timestamp_ms BIGINT NOT NULL
        )"
    );

    let create_escalations = format!(
        "CREATE TABLE IF NOT EXISTS {escalations} (
            id TEXT PRIMARY KEY,
            entry TEXT NOT NULL
        )"
    );

    sqlx::query(&create_cooldowns).execute(pool).await?;
    sqlx::query(&create_escalations).execute(pool).await?;

    Ok(())
}
