use serde::Serialize;

/// A `MessageCard` for Teams incoming webhooks.
///
/// Follows the Office 365 `MessageCard` format, the simplest way to send
/// formatted messages to a Teams channel.
#[derive(Debug, Clone, Serialize)]
pub struct TeamsMessageCard {
    /// Card type, always `"MessageCard"`.
    #[serde(rename = "@type")]
    pub card_type: String,

    /// Card context, always the Office 365 connector schema.
    #[serde(rename = "@context")]
    pub context: String,

    /// Summary text displayed in notifications.
    pub summary: String,

    /// Theme color as a hex string.
    #[serde(rename = "themeColor")]
    pub theme_color: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<TeamsSection>,

    #[serde(rename = "potentialAction", skip_serializing_if = "Vec::is_empty")]
    pub potential_action: Vec<TeamsOpenUriAction>,
}

impl TeamsMessageCard {
    /// Create a card with the alert theme color.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            card_type: "MessageCard".to_owned(),
            context: "https://schema.org/extensions".to_owned(),
            summary: summary.into(),
            theme_color: "EA4C89".to_owned(),
            title: None,
            sections: Vec::new(),
            potential_action: Vec::new(),
        }
    }

    /// Set the card title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a section.
    #[must_use]
    pub fn with_section(mut self, section: TeamsSection) -> Self {
        self.sections.push(section);
        self
    }

    /// Append an `OpenUri` action.
    #[must_use]
    pub fn with_action(mut self, action: TeamsOpenUriAction) -> Self {
        self.potential_action.push(action);
        self
    }
}

/// One section of a `MessageCard`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamsSection {
    #[serde(rename = "activityTitle", skip_serializing_if = "Option::is_none")]
    pub activity_title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<TeamsFact>,
}

/// A name/value fact rendered as a table row.
#[derive(Debug, Clone, Serialize)]
pub struct TeamsFact {
    pub name: String,
    pub value: String,
}

impl TeamsFact {
    /// Create a fact.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An `OpenUri` action button.
#[derive(Debug, Clone, Serialize)]
pub struct TeamsOpenUriAction {
    #[serde(rename = "@type")]
    pub action_type: String,
    pub name: String,
    pub targets: Vec<TeamsUriTarget>,
}

impl TeamsOpenUriAction {
    /// Create an `OpenUri` action with a default (all-OS) target.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            action_type: "OpenUri".to_owned(),
            name: name.into(),
            targets: vec![TeamsUriTarget {
                os: "default".to_owned(),
                uri: uri.into(),
            }],
        }
    }
}

/// One OS-specific URI for an `OpenUri` action.
#[derive(Debug, Clone, Serialize)]
pub struct TeamsUriTarget {
    pub os: String,
    pub uri: String,
}
