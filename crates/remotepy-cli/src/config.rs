//! Configuration loading and types

use std::path::{Path, PathBuf};

use remotepy_core::ExecutionSettings;
use serde::{Deserialize, Serialize};

/// Top-level configuration for remotepy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection defaults
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// How remote programs are launched
    #[serde(default)]
    pub execution: ExecutionSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the configuration was read from, `None` for built-in defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Connection defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key used instead of a password
    pub identity_file: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            identity_file: None,
        }
    }
}

fn default_port() -> u16 {
    22
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read config {}: {e}", path.display()))?;
        let mut config: Config = toml::from_str(&content)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load from an explicit path, the environment, default paths, or use defaults
    ///
    /// # Errors
    /// Returns error if a config file is found but cannot be loaded
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("REMOTEPY_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let mut paths = vec![PathBuf::from("remotepy.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("remotepy/remotepy.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }
}
