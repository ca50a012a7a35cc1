//! Discord webhook channel.
//!
//! Renders alerts into a single embed and posts it to the channel target
//! URL. Field values are clamped to Discord's 1024-character limit.

pub mod error;
pub mod provider;
pub mod types;

pub use error::DiscordError;
pub use provider::DiscordChannel;
pub use types::{DiscordEmbed, DiscordEmbedField, DiscordEmbedFooter, DiscordWebhookRequest};
