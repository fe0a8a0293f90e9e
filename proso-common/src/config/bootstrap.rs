//! Server start-up configuration and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PROSO_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "proso.db";

/// Settings file name inside the root folder
pub const SETTINGS_FILE: &str = "proso_config.toml";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
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
    "info".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

/// TOML server config; every field is optional in the file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application settings file; defaults to `<root>/proso_config.toml`
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            settings_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Where the server config was taken from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was missing
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Report the source; the config is loaded before logging is set up
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config file {}", path.display()),
            ConfigSource::Defaults(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
        }
    }
}

impl ServerConfig {
    /// Load the TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    pub fn settings_path(&self, root_folder: &Path) -> PathBuf {
        self.settings_file
            .clone()
            .unwrap_or_else(|| root_folder.join(SETTINGS_FILE))
    }
}

/// Root folder resolution in priority order:
/// 1. Command-line argument
/// 2. Environment variable `PROSO_ROOT_FOLDER`
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &ServerConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = &config.root_folder {
        return path.clone();
    }
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("proso"))
        .unwrap_or_else(|| PathBuf::from("./proso_data"))
}

/// Default location of the TOML server config
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("proso").join("server.toml"))
        .unwrap_or_else(|| PathBuf::from("server.toml"))
}
