use thiserror::Error;

/// Errors from the repository layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique-key constraint was violated; the caller should re-read the
    /// winner and apply the update path instead.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transient backend fault; the caller may retry later.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether the error is transient and worth a retry at the boundary.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
