use thiserror::Error;

/// Errors from the notification state store.
///
/// The engine treats these as non-fatal: in-memory state stays correct for
/// the current process, at the cost of durability for the affected entry.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing store rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Could not reach the backing store.
    #[error("connection error: {0}")]
    Connection(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
