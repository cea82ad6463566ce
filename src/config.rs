//! Configuration loading from TOML files and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::threshold::IdleLimit;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP control surface binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inactivity monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Idle limit to arm with at startup. Unset means wait for the control surface.
    #[serde(default)]
    pub initial_limit_seconds: Option<f64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            initial_limit_seconds: None,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Power-off behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Log the power-off instead of running it.
    #[serde(default)]
    pub dry_run: bool,
    /// Command line replacing the platform default.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write the JSONL event journal.
    #[serde(default = "default_journal")]
    pub journal: bool,
    /// Data directory holding the journal.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            journal: default_journal(),
            data_dir: default_data_dir(),
        }
    }
}

impl LoggingConfig {
    /// Returns the journal directory path.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journal() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".idlewatch"))
        .unwrap_or_else(|| PathBuf::from(".idlewatch"))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::from_file(path)?
        } else {
            let default_paths = [
                PathBuf::from("config/default.toml"),
                dirs::config_dir()
                    .map(|d| d.join("idlewatch/config.toml"))
                    .unwrap_or_default(),
            ];

            let mut loaded = None;
            for path in &default_paths {
                if path.is_file() {
                    loaded = Some(Self::from_file(path)?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.logging.data_dir = expand_tilde(&config.logging.data_dir);

        Ok(config)
    }

    /// Apply `IDLEWATCH_*` overrides looked up through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("IDLEWATCH_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("IDLEWATCH_PORT") {
            if let Ok(v) = val.parse() {
                self.server.port = v;
            }
        }
        if let Some(val) = lookup("IDLEWATCH_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// The startup idle limit, if one is configured.
    pub fn initial_limit(&self) -> Result<Option<IdleLimit>> {
        self.monitor
            .initial_limit_seconds
            .map(IdleLimit::new)
            .transpose()
            .context("Invalid monitor.initial_limit_seconds")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }
        if self.monitor.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }
        self.initial_limit()?;
        if let Some(command) = &self.shutdown.command {
            if command.is_empty() || command[0].is_empty() {
                anyhow::bail!("Shutdown command override cannot be empty");
            }
        }
        Ok(())
    }
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
