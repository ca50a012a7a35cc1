use serde::{Deserialize, Serialize};

/// Maximum length Discord accepts for an embed field value.
pub(crate) const MAX_FIELD_LEN: usize = 1024;

/// Request body for a Discord webhook execution.
#[derive(Debug, Clone, Serialize)]
pub struct DiscordWebhookRequest {
    /// Rich embed objects. Up to 10 embeds per message.
    pub embeds: Vec<DiscordEmbed>,
}

/// A Discord embed object for rich message formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Embed color as a decimal integer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<DiscordEmbedField>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<DiscordEmbedFooter>,

    /// ISO 8601 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A field within a Discord embed. Values are clamped to 1024 characters
/// at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordEmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
}

impl DiscordEmbedField {
    /// Create an inline field, clamping the value to the Discord limit.
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: clamp_value(value.into()),
            inline: Some(true),
        }
    }

    /// Create a block field, clamping the value to the Discord limit.
    pub fn block(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: clamp_value(value.into()),
            inline: Some(false),
        }
    }
}

fn clamp_value(value: String) -> String {
    if value.chars().count() <= MAX_FIELD_LEN {
        return value;
    }
    value.chars().take(MAX_FIELD_LEN).collect()
}

/// Footer for a Discord embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordEmbedFooter {
    pub text: String,
}
