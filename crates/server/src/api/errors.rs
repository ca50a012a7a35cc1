use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use faultline_core::ErrorEvent;

use crate::api::authenticate;
use crate::app::AppState;
use crate::error::ServerError;

/// `POST /api/errors`: the core's one inbound surface.
///
/// Success answers `201` with the grouping outcome; malformed events get
/// `422`; transient storage faults soft-accept with `202` so the client
/// can retry.
#[instrument(skip_all)]
pub async fn ingest_error(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let project = authenticate(&state, &headers).await?;

    let event: ErrorEvent = serde_json::from_slice(&body)
        .map_err(|e| ServerError::Validation(format!("malformed event: {e}")))?;

    let outcome = state.ingestor.ingest(&event, &project).await?;

    let body = serde_json::json!({
        "data": {
            "id": outcome.issue.id,
            "errorId": outcome.occurrence.id,
            "fingerprint": outcome.fingerprint,
            "count": outcome.issue.count,
            "status": outcome.issue.status,
            "isNew": outcome.is_new,
            "lastSeen": outcome.issue.last_seen,
        }
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}
