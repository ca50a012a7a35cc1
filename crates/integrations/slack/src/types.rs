use serde::{Deserialize, Serialize};

/// A Slack text object (`mrkdwn` or `plain_text`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackText {
    #[serde(rename = "type")]
    pub text_type: String,
    pub text: String,
}

impl SlackText {
    /// Create a `mrkdwn` text object.
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn".to_owned(),
            text: text.into(),
        }
    }

    /// Create a `plain_text` text object.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text_type: "plain_text".to_owned(),
            text: text.into(),
        }
    }
}

/// A button element inside an actions block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackButton {
    #[serde(rename = "type")]
    pub element_type: String,
    pub text: SlackText,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl SlackButton {
    /// Create a link button.
    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            element_type: "button".to_owned(),
            text: SlackText::plain(label),
            url: url.into(),
            style: None,
        }
    }

    /// Mark the button as primary.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.style = Some("primary".to_owned());
        self
    }
}

/// One Block Kit block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<SlackText>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<SlackText>>,
    },
    Context {
        elements: Vec<SlackText>,
    },
    Actions {
        elements: Vec<SlackButton>,
    },
}

impl SlackBlock {
    /// A section with body text only.
    pub fn section(text: impl Into<String>) -> Self {
        Self::Section {
            text: Some(SlackText::mrkdwn(text)),
            fields: None,
        }
    }

    /// A section carrying only fields.
    #[must_use]
    pub fn fields(fields: Vec<SlackText>) -> Self {
        Self::Section {
            text: None,
            fields: Some(fields),
        }
    }
}

/// The message posted to a Slack incoming webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessage {
    /// Fallback text for notifications.
    pub text: String,
    pub blocks: Vec<SlackBlock>,
}
