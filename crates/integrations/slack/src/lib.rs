//! Slack incoming-webhook channel.
//!
//! Renders alerts into a Block Kit message (`{text, blocks}`) and posts it
//! to the channel target URL. The dispatcher wraps this channel in a
//! circuit breaker.

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::SlackConfig;
pub use error::SlackError;
pub use provider::SlackChannel;
pub use types::{SlackBlock, SlackButton, SlackMessage, SlackText};
