//! Event ingestion.
//!
//! `ingest` sanitizes the raw event, fingerprints it, upserts the issue
//! (retrying the unique-key race), appends the immutable occurrence, and
//! fires the asynchronous fan-out: analytics cache invalidation and the
//! trigger pipeline. Fan-out failures are logged and never fail the
//! ingestion response.

pub mod error;
pub mod ingestor;

pub use error::IngestError;
pub use ingestor::{AnalyticsInvalidator, IngestOutcome, Ingestor};
