use thiserror::Error;

/// Errors surfaced by the notification engine.
///
/// State-store failures are deliberately absent: they are logged and the
/// in-memory state stays authoritative for the current process.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Every channel of a non-empty channel list failed; the flush will be
    /// retried from the retained bucket.
    #[error("all channels failed for rule {rule_id}")]
    AllChannelsFailed { rule_id: String },

    /// The engine is shutting down.
    #[error("engine stopped")]
    Stopped,
}
