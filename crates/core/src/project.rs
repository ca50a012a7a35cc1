use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::ProjectId;

/// Which categories of personally identifiable data the sanitizer removes
/// for a project, beyond the always-on credential and card masking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrubPolicy {
    /// Replace email addresses with `[REDACTED:EMAIL]`.
    #[serde(default)]
    pub remove_emails: bool,
    /// Replace phone numbers with `[REDACTED:PHONE]`.
    #[serde(default)]
    pub remove_phones: bool,
    /// Replace IPv4 addresses with `[REDACTED:IP]`.
    #[serde(default)]
    pub remove_ips: bool,
}

/// A monitored project: the tenant boundary for issues, rules, and retention.
///
/// The ingestion bearer credential is never stored in the clear; only a
/// salted SHA-256 digest plus a short preview survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Hex digest of `sha256(salt ":" key)`.
    pub api_key_hash: String,
    /// Salt mixed into the credential digest.
    pub api_key_salt: String,
    /// First characters of the original key, for display purposes only.
    pub api_key_preview: String,
    /// How long issues and occurrences are kept, in days. Zero disables
    /// retention cleanup.
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub scrub: ScrubPolicy,
}

impl Project {
    /// Create a project from a plaintext API key, hashing it immediately.
    pub fn new(
        id: impl Into<ProjectId>,
        name: impl Into<String>,
        api_key: &str,
        salt: impl Into<String>,
    ) -> Self {
        let salt = salt.into();
        Self {
            id: id.into(),
            name: name.into(),
            api_key_hash: hash_api_key(&salt, api_key),
            api_key_salt: salt,
            api_key_preview: key_preview(api_key),
            retention_days: 0,
            scrub: ScrubPolicy::default(),
        }
    }

    /// Set the retention window in days.
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Set the scrubbing policy.
    #[must_use]
    pub fn with_scrub(mut self, scrub: ScrubPolicy) -> Self {
        self.scrub = scrub;
        self
    }

    /// Check a presented bearer credential against the stored digest.
    #[must_use]
    pub fn verify_api_key(&self, presented: &str) -> bool {
        hash_api_key(&self.api_key_salt, presented) == self.api_key_hash
    }
}

/// Compute the salted credential digest stored on a project.
#[must_use]
pub fn hash_api_key(salt: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short display preview of an API key (first six characters).
#[must_use]
pub fn key_preview(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    if key.chars().count() > 6 {
        format!("{prefix}\u{2026}")
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_round_trip() {
        let project = Project::new("p1", "Checkout", "fk_live_abcdef123456", "salt-1");
        assert!(project.verify_api_key("fk_live_abcdef123456"));
        assert!(!project.verify_api_key("fk_live_wrong"));
    }

    #[test]
    fn hash_depends_on_salt() {
        assert_ne!(hash_api_key("a", "key"), hash_api_key("b", "key"));
    }

    #[test]
    fn preview_is_truncated() {
        assert_eq!(key_preview("fk_live_abc"), "fk_liv\u{2026}");
        assert_eq!(key_preview("short"), "short");
    }

    #[test]
    fn plaintext_key_never_serialized() {
        let project = Project::new("p1", "Checkout", "super-secret-key", "s");
        let json = serde_json::to_string(&project).unwrap();
        assert!(!json.contains("super-secret-key"));
        assert!(json.contains("apiKeyHash"));
    }
}
