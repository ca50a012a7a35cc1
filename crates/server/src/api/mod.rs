pub mod alerts;
pub mod errors;
pub mod health;

use axum::http::HeaderMap;

use faultline_core::Project;

use crate::app::AppState;
use crate::error::ServerError;

/// Resolve the project from the bearer credential in `Authorization`.
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Project, ServerError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("missing bearer credential".into()))?;

    state
        .projects
        .find_by_api_key(token)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .ok_or_else(|| ServerError::Unauthorized("unknown credential".into()))
}
