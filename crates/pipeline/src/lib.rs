//! The trigger pipeline.
//!
//! After ingestion persists an occurrence, this pipeline loads the
//! project's enabled rules, derives a metrics block per rule (windowed
//! counts and baselines where needed), evaluates, builds enriched alert
//! payloads for the rules that fired, and hands them to the notification
//! engine. A failure in one rule never stops the others.

pub mod enrich;
pub mod trigger;

pub use enrich::ContextEnricher;
pub use trigger::{TriggerConfig, TriggerPipeline, TriggerReport};
