use thiserror::Error;

use faultline_storage::StorageError;

/// Errors surfaced by ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The event is malformed; never retried.
    #[error("invalid event: {0}")]
    Validation(String),

    /// The issue or occurrence could not be persisted.
    #[error("storage failure: {0}")]
    Store(#[from] StorageError),
}

impl IngestError {
    /// Whether the HTTP boundary may soft-accept (202) and let the client
    /// retry later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}
