use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locations: LocationsConfig,
    pub warehouse: WarehouseConfig,
    pub policy: PolicyConfig,
    pub notify: NotifyConfig,
}

/// Directory layout for the three object locations a file moves through.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    pub incoming_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub archive_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Fraction of rows that may be rejected before the whole file fails.
    pub max_reject_ratio: f64,
    /// Age after which a PENDING claim is considered abandoned and can be taken over.
    pub claim_freshness_secs: u64,
    /// Wall-clock budget for one invocation.
    pub deadline_secs: u64,
    /// Minimum budget that must remain before cleaning is allowed to start.
    pub clean_budget_floor_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub outbox_path: PathBuf,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locations: LocationsConfig::default(),
            warehouse: WarehouseConfig::default(),
            policy: PolicyConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            incoming_dir: PathBuf::from("data/incoming"),
            staging_dir: PathBuf::from("data/processed"),
            archive_dir: PathBuf::from("data/archived"),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/roster.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_reject_ratio: 0.5,
            claim_freshness_secs: 900,
            deadline_secs: 540,
            clean_budget_floor_secs: 30,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            outbox_path: PathBuf::from("data/outbox.ndjson"),
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads configuration from an explicit path, from `config.toml` when present,
    /// or from built-in defaults, then applies `ROSTER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("config.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = env::var("ROSTER_INCOMING_DIR") {
            self.locations.incoming_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("ROSTER_STAGING_DIR") {
            self.locations.staging_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("ROSTER_ARCHIVE_DIR") {
            self.locations.archive_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("ROSTER_DB_PATH") {
            self.warehouse.db_path = PathBuf::from(path);
        }
        if let Ok(raw) = env::var("ROSTER_MAX_REJECT_RATIO") {
            self.policy.max_reject_ratio = raw.parse().map_err(|e| {
                PipelineError::Config(format!("ROSTER_MAX_REJECT_RATIO must be a number: {e}"))
            })?;
        }
        if let Ok(raw) = env::var("ROSTER_DEADLINE_SECS") {
            self.policy.deadline_secs = raw.parse().map_err(|e| {
                PipelineError::Config(format!("ROSTER_DEADLINE_SECS must be an integer: {e}"))
            })?;
        }
        if let Ok(path) = env::var("ROSTER_OUTBOX_PATH") {
            self.notify.outbox_path = PathBuf::from(path);
        }
        if let Ok(url) = env::var("ROSTER_WEBHOOK_URL") {
            self.notify.webhook_url = if url.is_empty() { None } else { Some(url) };
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.policy.max_reject_ratio) {
            return Err(PipelineError::Config(format!(
                "max_reject_ratio must be between 0.0 and 1.0, got {}",
                self.policy.max_reject_ratio
            )));
        }
        if self.policy.deadline_secs == 0 {
            return Err(PipelineError::Config(
                "deadline_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
