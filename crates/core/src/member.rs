use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ProjectId;

/// How a member receives alert emails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailMode {
    #[default]
    Immediate,
    Digest,
    Disabled,
}

/// Digest cadence for members in digest mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestCadence {
    #[default]
    Daily,
    Weekly,
}

impl DigestCadence {
    /// Length of the cadence window.
    #[must_use]
    pub fn window(self) -> chrono::Duration {
        match self {
            Self::Daily => chrono::Duration::hours(24),
            Self::Weekly => chrono::Duration::days(7),
        }
    }
}

/// A daily window during which immediate emails are diverted to the digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    #[serde(default)]
    pub enabled: bool,
    /// `HH:MM` in the member's timezone.
    #[serde(default)]
    pub start: String,
    /// `HH:MM` in the member's timezone.
    #[serde(default)]
    pub end: String,
    /// IANA timezone name; UTC is assumed when unparsable.
    #[serde(default)]
    pub timezone: String,
}

/// Digest bookkeeping for a member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestPreference {
    #[serde(default)]
    pub cadence: DigestCadence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_at: Option<DateTime<Utc>>,
}

/// Email delivery preferences for a member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailPreference {
    #[serde(default)]
    pub mode: EmailMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default)]
    pub digest: DigestPreference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe_token: Option<String>,
}

/// Per-member alert preferences. Only the email leg is consumed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPreferences {
    #[serde(default)]
    pub email: EmailPreference,
}

/// A project team member, as consumed by the email pipeline. Membership
/// management lives outside this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub project_id: ProjectId,
    pub email: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub alert_preferences: AlertPreferences,
}

fn default_active() -> bool {
    true
}

impl TeamMember {
    /// Create an active member with default (immediate) preferences.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<ProjectId>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            email: email.into(),
            active: true,
            alert_preferences: AlertPreferences::default(),
        }
    }

    /// Set the email delivery mode.
    #[must_use]
    pub fn with_email_mode(mut self, mode: EmailMode) -> Self {
        self.alert_preferences.email.mode = mode;
        self
    }

    /// Set quiet hours.
    #[must_use]
    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.alert_preferences.email.quiet_hours = Some(quiet_hours);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_immediate_and_active() {
        let member = TeamMember::new("m1", "p1", "a@x.test");
        assert!(member.active);
        assert_eq!(member.alert_preferences.email.mode, EmailMode::Immediate);
        assert_eq!(
            member.alert_preferences.email.digest.cadence,
            DigestCadence::Daily
        );
    }

    #[test]
    fn cadence_windows() {
        assert_eq!(DigestCadence::Daily.window(), chrono::Duration::hours(24));
        assert_eq!(DigestCadence::Weekly.window(), chrono::Duration::days(7));
    }

    #[test]
    fn member_serde_round_trip() {
        let member = TeamMember::new("m1", "p1", "a@x.test")
            .with_email_mode(EmailMode::Digest)
            .with_quiet_hours(QuietHours {
                enabled: true,
                start: "22:00".into(),
                end: "07:00".into(),
                timezone: "Europe/Berlin".into(),
            });
        let json = serde_json::to_string(&member).unwrap();
        let back: TeamMember = serde_json::from_str(&json).unwrap();
        assert_eq!(back.alert_preferences.email.mode, EmailMode::Digest);
        assert_eq!(
            back.alert_preferences.email.quiet_hours.unwrap().start,
            "22:00"
        );
    }
}
