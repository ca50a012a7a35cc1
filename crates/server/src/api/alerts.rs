use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use tracing::instrument;

use crate::api::authenticate;
use crate::app::AppState;
use crate::error::ServerError;

/// `POST /api/alerts/{id}/acknowledge`: stop pending escalation levels.
#[instrument(skip(state, headers))]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alert_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    authenticate(&state, &headers).await?;
    let found = state.engine.acknowledge(&alert_id).await;
    Ok(Json(serde_json::json!({"data": {"found": found}})))
}

/// `POST /api/alerts/{id}/resolve`: stop pending escalation levels.
#[instrument(skip(state, headers))]
pub async fn resolve_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(alert_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    authenticate(&state, &headers).await?;
    let found = state.engine.resolve(&alert_id).await;
    Ok(Json(serde_json::json!({"data": {"found": found}})))
}
