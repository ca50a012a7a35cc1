use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use faultline_ingest::IngestError;

/// Errors that can occur when running the Faultline server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error. Fatal at bootstrap.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed (missing or invalid credentials).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed input at the HTTP boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// A transient storage fault the client may retry; answered with a
    /// soft 202.
    #[error("accepted for later processing: {0}")]
    SoftAccepted(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<IngestError> for ServerError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => Self::Validation(msg),
            IngestError::Store(e) if e.is_transient() => Self::SoftAccepted(e.to_string()),
            IngestError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            Self::SoftAccepted(_) => (
                StatusCode::ACCEPTED,
                axum::Json(serde_json::json!({"data": {"accepted": true}})),
            )
                .into_response(),
            Self::Unauthorized(msg) => error_response(StatusCode::UNAUTHORIZED, msg),
            Self::Validation(msg) => error_response(StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Config(msg) | Self::Internal(msg) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::Io(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_storage::StorageError;

    #[test]
    fn transient_store_faults_soft_accept() {
        let err: ServerError = IngestError::Store(StorageError::Backend("down".into())).into();
        assert!(matches!(err, ServerError::SoftAccepted(_)));
    }

    #[test]
    fn validation_maps_to_422() {
        let err: ServerError = IngestError::Validation("no message".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
