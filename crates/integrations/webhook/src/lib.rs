//! Generic HTTP webhook channel.
//!
//! Posts the alert envelope `{timestamp, project, rule, alert, links}` as
//! JSON to the channel target URL. Non-2xx responses are errors; the
//! default timeout is seven seconds.

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::WebhookConfig;
pub use error::WebhookError;
pub use provider::WebhookChannel;
pub use types::WebhookEnvelope;
