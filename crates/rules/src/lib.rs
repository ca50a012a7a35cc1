//! Pure rule evaluation.
//!
//! [`evaluate`] reads only the rule definition and the supplied metrics
//! block; it performs no I/O, so equal inputs always yield equal outputs.

pub mod evaluator;
pub mod filter;
pub mod metrics;

pub use evaluator::{Evaluation, TriggerReason, evaluate};
pub use filter::evaluate_filter;
pub use metrics::RuleMetrics;
