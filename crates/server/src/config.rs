use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use faultline_core::{AlertRule, Project, ScrubPolicy, TeamMember};
use faultline_email::SmtpConfig;

use crate::error::ServerError;

/// Which backend persists notification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateDriver {
    Memory,
    /// The document-store driver (JSONB rows keyed by id).
    Postgres,
}

impl StateDriver {
    fn parse(value: &str) -> Result<Self, ServerError> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(ServerError::Config(format!(
                "unknown ALERT_STATE_DRIVER {other:?} (expected memory or postgres)"
            ))),
        }
    }
}

/// Runtime configuration, resolved from the environment at bootstrap.
/// Invalid required values abort startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub aggregation_window: Duration,
    pub cooldown_minutes: u32,
    pub escalation_minutes: f64,
    pub deployment_lookback: Duration,
    pub digest_interval: Duration,
    pub retention_interval: Duration,
    pub webhook_timeout: Duration,
    pub state_driver: StateDriver,
    /// Connection URL for the postgres driver.
    pub state_url: Option<String>,
    pub dashboard_base_url: Option<String>,
    pub api_base_url: Option<String>,
    /// Path of the TOML file seeding projects, rules, and members.
    pub config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            aggregation_window: Duration::from_secs(300),
            cooldown_minutes: 30,
            escalation_minutes: 120.0,
            deployment_lookback: Duration::from_secs(12 * 3600),
            digest_interval: Duration::from_secs(15 * 60),
            retention_interval: Duration::from_secs(3600),
            webhook_timeout: Duration::from_secs(7),
            state_driver: StateDriver::Memory,
            state_url: None,
            dashboard_base_url: None,
            api_base_url: None,
            config_path: None,
        }
    }
}

impl ServerConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(value) = read_env("FAULTLINE_BIND_ADDR") {
            config.bind_addr = value
                .parse()
                .map_err(|e| ServerError::Config(format!("invalid FAULTLINE_BIND_ADDR: {e}")))?;
        }
        if let Some(ms) = parse_env_u64("ALERT_AGGREGATION_WINDOW_MS")? {
            config.aggregation_window = Duration::from_millis(ms);
        }
        if let Some(minutes) = parse_env_u64("ALERT_COOLDOWN_MINUTES")? {
            config.cooldown_minutes = u32::try_from(minutes)
                .map_err(|_| ServerError::Config("ALERT_COOLDOWN_MINUTES out of range".into()))?;
        }
        if let Some(value) = read_env("ALERT_ESCALATION_MINUTES") {
            let minutes: f64 = value.parse().map_err(|e| {
                ServerError::Config(format!("invalid ALERT_ESCALATION_MINUTES: {e}"))
            })?;
            if !minutes.is_finite() || minutes <= 0.0 {
                return Err(ServerError::Config(
                    "ALERT_ESCALATION_MINUTES must be positive and finite".into(),
                ));
            }
            config.escalation_minutes = minutes;
        }
        if let Some(ms) = parse_env_u64("ALERT_DEPLOYMENT_LOOKBACK_MS")? {
            config.deployment_lookback = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_u64("ALERT_DIGEST_INTERVAL_MS")? {
            config.digest_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_env_u64("RETENTION_CLEANUP_INTERVAL_MS")? {
            config.retention_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_env_u64("WEBHOOK_TIMEOUT_MS")? {
            config.webhook_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(value) = read_env("ALERT_STATE_DRIVER") {
            config.state_driver = StateDriver::parse(&value)?;
        }
        config.state_url = read_env("FAULTLINE_STATE_URL");
        config.dashboard_base_url = read_env("FAULTLINE_DASHBOARD_URL");
        config.api_base_url = read_env("FAULTLINE_API_URL");
        config.config_path = read_env("FAULTLINE_CONFIG").map(PathBuf::from);

        if config.state_driver == StateDriver::Postgres && config.state_url.is_none() {
            return Err(ServerError::Config(
                "ALERT_STATE_DRIVER=postgres requires FAULTLINE_STATE_URL".into(),
            ));
        }

        Ok(config)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_u64(key: &str) -> Result<Option<u64>, ServerError> {
    match read_env(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ServerError::Config(format!("invalid {key}: {e}"))),
    }
}

/// One project seeded from the TOML file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSeed {
    pub id: String,
    pub name: String,
    pub api_key: String,
    #[serde(default = "default_salt")]
    pub salt: String,
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub scrub: ScrubPolicy,
}

fn default_salt() -> String {
    "faultline".to_owned()
}

impl ProjectSeed {
    /// Convert into a project, hashing the credential.
    #[must_use]
    pub fn into_project(self) -> Project {
        Project::new(self.id, self.name, &self.api_key, self.salt)
            .with_retention_days(self.retention_days)
            .with_scrub(self.scrub)
    }
}

/// Mailer settings from the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailerSeed {
    pub from: String,
    #[serde(default)]
    pub unsubscribe_base_url: Option<String>,
}

/// The TOML file seeding projects, rules, and members.
///
/// Project and rule administration is handled outside this service; the
/// file is how a deployment hands the core its read-side data.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub projects: Vec<ProjectSeed>,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub mailer: Option<MailerSeed>,
}

impl FileConfig {
    /// Load and validate the file.
    pub fn load(path: &std::path::Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("cannot parse {}: {e}", path.display())))?;

        for rule in &config.rules {
            rule.validate().map_err(|e| {
                ServerError::Config(format!("invalid rule {}: {e}", rule.id))
            })?;
        }
        Ok(config)
    }
}
