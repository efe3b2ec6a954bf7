use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.json5";
const DATABASE_FILE_NAME: &str = "cronkeeper.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json5(#[from] json5::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoDirFound,
}

/// Failure polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between polling ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            enabled: true,
        }
    }
}

/// Execution history retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Records kept per job; older ones are trimmed first.
    #[serde(default = "default_max_records")]
    pub max_records_per_job: usize,
}

fn default_max_records() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records_per_job: default_max_records(),
        }
    }
}

/// System schedule-table tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrontabConfig {
    /// Program used to list and replace the table.
    #[serde(default = "default_crontab_program")]
    pub program: String,
    /// Arguments placed before the list/replace arguments, e.g. `["-u", "alice"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

fn default_crontab_program() -> String {
    "crontab".to_string()
}

impl Default for CrontabConfig {
    fn default() -> Self {
        Self {
            program: default_crontab_program(),
            args: Vec::new(),
        }
    }
}

/// How failure notifications are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Desktop,
    Log,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub backend: NotifierKind,
}

/// Top-level cronkeeper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronKeeperConfig {
    /// Directory holding the job database (defaults to the config dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub crontab: CrontabConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// `~/.cronkeeper/`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoDirFound)?;
    Ok(home.join(".cronkeeper"))
}

/// `~/.cronkeeper/config.json5`
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Load `.env`, then the config file at the default location.
pub fn load_config() -> Result<CronKeeperConfig, ConfigError> {
    if let Ok(env_file) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", env_file.display());
    }
    load_config_from(&config_file_path()?)
}

/// Parse the config at `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<CronKeeperConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(json5::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(CronKeeperConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write `config` to the default location.
pub fn save_config(config: &CronKeeperConfig) -> Result<(), ConfigError> {
    save_config_to(&ensure_config_dir()?.join(CONFIG_FILE_NAME), config)
}

/// Write `config` to `path` as pretty JSON (valid JSON5), creating its
/// parent directory if needed.
pub fn save_config_to(path: &Path, config: &CronKeeperConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut text = serde_json::to_string_pretty(config)?;
    text.push('\n');
    std::fs::write(path, text)?;
    tracing::info!("Config written to {}", path.display());
    Ok(())
}

/// Path of the job database, creating its directory if needed.
pub fn database_path(config: &CronKeeperConfig) -> Result<PathBuf, ConfigError> {
    let dir = match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => ensure_config_dir()?,
    };
    Ok(dir.join(DATABASE_FILE_NAME))
}
