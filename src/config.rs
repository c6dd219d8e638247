//! Configuration loader and validator for the Action Network sync.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::budget::{parse_memory_limit, BudgetLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub actionnetwork: ActionNetwork,
    pub sync: SyncBudget,
    pub continuation: Continuation,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote API settings. Credentials live in the groups table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionNetwork {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

/// Per-process budget of the drain loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncBudget {
    pub max_elapsed_seconds: u64,
    pub max_depth: u32,
    /// e.g. `128M`, `1G`; `-1` means unlimited.
    pub memory_limit: String,
    pub memory_headroom: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationMode {
    /// Re-execute this binary with `resume` arguments.
    Spawn,
    /// POST the counters to `continuation.url`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Continuation {
    pub mode: ContinuationMode,
    #[serde(default)]
    pub url: String,
}

impl App {
    /// `data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> String {
        match (self.data_dir.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
            _ => self.data_dir.clone(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// `DATABASE_URL` if set, else a SQLite file inside the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/sync.db", self.app.resolved_data_dir()))
    }

    pub fn budget_limits(&self) -> Result<BudgetLimits, ConfigError> {
        let memory_ceiling_bytes = parse_memory_limit(&self.sync.memory_limit)
            .ok_or(ConfigError::Invalid("sync.memory_limit is not a valid size"))?;
        Ok(BudgetLimits {
            max_elapsed: Duration::from_secs(self.sync.max_elapsed_seconds),
            max_depth: self.sync.max_depth,
            memory_ceiling_bytes,
            memory_headroom: self.sync.memory_headroom,
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.actionnetwork.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("actionnetwork.base_url must be non-empty"));
    }
    if !cfg.actionnetwork.base_url.ends_with('/') {
        return Err(ConfigError::Invalid("actionnetwork.base_url must end with '/'"));
    }
    if cfg.actionnetwork.request_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "actionnetwork.request_timeout_seconds must be > 0",
        ));
    }

    if cfg.sync.max_elapsed_seconds == 0 {
        return Err(ConfigError::Invalid("sync.max_elapsed_seconds must be > 0"));
    }
    if !(cfg.sync.memory_headroom > 0.0 && cfg.sync.memory_headroom <= 1.0) {
        return Err(ConfigError::Invalid("sync.memory_headroom must be in (0, 1]"));
    }
    cfg.budget_limits()?;

    if cfg.continuation.mode == ContinuationMode::Http && cfg.continuation.url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "continuation.url must be non-empty when continuation.mode is http",
        ));
    }

    Ok(())
}

/// Returns a complete example configuration file.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

actionnetwork:
  base_url: "https://actionnetwork.org/api/v2/"
  request_timeout_seconds: 30

sync:
  max_elapsed_seconds: 20
  max_depth: 100
  memory_limit: "128M"
  memory_headroom: 0.9

continuation:
  mode: spawn
"#
}
