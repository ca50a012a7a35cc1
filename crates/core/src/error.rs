use thiserror::Error;

/// Top-level error type for the Faultline system.
#[derive(Debug, Error)]
pub enum FaultlineError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("state error: {0}")]
    State(String),

    #[error("rule error: {0}")]
    Rule(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("ingestion error: {0}")]
    Ingest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}
