//! The email pipeline.
//!
//! Resolves recipients, routes each one to immediate delivery or the
//! digest queue (preference- and quiet-hours-driven), renders HTML and
//! plain-text bodies, and runs the periodic digest scheduler.

pub mod channel;
pub mod config;
pub mod digest;
pub mod pipeline;
pub mod quiet_hours;
pub mod recipients;
pub mod render;

pub use channel::EmailChannel;
pub use config::MailerConfig;
pub use digest::{DigestProcessor, DigestScheduler};
pub use pipeline::{DeliveryReport, EmailPipeline};
pub use quiet_hours::quiet_hours_active;
pub use recipients::resolve_recipients;
