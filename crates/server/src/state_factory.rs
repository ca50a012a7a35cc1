use std::sync::Arc;

use tracing::info;

use faultline_state::NotificationStateStore;
use faultline_state_memory::MemoryStateStore;
use faultline_state_postgres::{PostgresConfig, PostgresStateStore};

use crate::config::{ServerConfig, StateDriver};
use crate::error::ServerError;

/// Build the notification state store selected by `ALERT_STATE_DRIVER`.
pub async fn build_state_store(
    config: &ServerConfig,
) -> Result<Arc<dyn NotificationStateStore>, ServerError> {
    match config.state_driver {
        StateDriver::Memory => {
            info!("using in-memory notification state store");
            Ok(Arc::new(MemoryStateStore::new()))
        }
        StateDriver::Postgres => {
            let url = config.state_url.as_ref().ok_or_else(|| {
                ServerError::Config("postgres state driver requires FAULTLINE_STATE_URL".into())
            })?;
            info!("connecting postgres notification state store");
            let store = PostgresStateStore::new(PostgresConfig::new(url))
                .await
                .map_err(|e| ServerError::Config(format!("state store connect failed: {e}")))?;
            Ok(Arc::new(store))
        }
    }
}
