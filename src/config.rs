//! Configuration module for FileVault.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, VaultError};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins (empty = allow any origin without credentials).
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/filevault.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upload limits and storage tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed mimetypes. Empty means every type is accepted.
    #[serde(default)]
    pub accepted_types: Vec<String>,
    /// Size of a stored chunk in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Page size used when a listing does not ask for one.
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    /// Upper bound for a requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
}

fn default_max_file_size() -> u64 {
    crate::file::DEFAULT_MAX_FILE_SIZE
}

fn default_chunk_size() -> usize {
    crate::file::DEFAULT_CHUNK_SIZE
}

fn default_page_size() -> i64 {
    crate::file::DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> i64 {
    200
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            accepted_types: Vec::new(),
            chunk_size: default_chunk_size(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty disables file logging.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filevault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload limits.
    #[serde(default)]
    pub files: FilesConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEVAULT_DATABASE_PATH`: database file path
    /// - `FILEVAULT_MAX_FILE_SIZE`: maximum upload size in bytes
    /// - `FILEVAULT_ACCEPTED_TYPES`: comma separated mimetype allow-list
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FILEVAULT_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }

        if let Ok(size) = std::env::var("FILEVAULT_MAX_FILE_SIZE") {
            match size.trim().parse::<u64>() {
                Ok(size) => self.files.max_file_size = size,
                Err(_) => tracing::warn!(value = %size, "Ignoring invalid FILEVAULT_MAX_FILE_SIZE"),
            }
        }

        if let Ok(types) = std::env::var("FILEVAULT_ACCEPTED_TYPES") {
            self.files.accepted_types = parse_type_list(&types);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.files.max_file_size == 0 {
            return Err(VaultError::Config(
                "files.max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.files.chunk_size == 0 {
            return Err(VaultError::Config(
                "files.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.files.default_page_size < 1 || self.files.max_page_size < 1 {
            return Err(VaultError::Config(
                "files page sizes must be at least 1".to_string(),
            ));
        }
        if self.files.default_page_size > self.files.max_page_size {
            return Err(VaultError::Config(format!(
                "files.default_page_size ({}) exceeds files.max_page_size ({})",
                self.files.default_page_size, self.files.max_page_size
            )));
        }
        Ok(())
    }
}

/// Split a comma separated mimetype list, dropping blanks.
fn parse_type_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
