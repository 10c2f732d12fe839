//! Configuration loading and resolution
//!
//! Two values leave this module: a [`ConnectionConfig`] describing how to
//! reach the relational store, and an [`IngestConfig`] with batch tuning.
//! Both are resolved once at startup and then passed explicitly into the
//! loader; nothing downstream reads the process environment.
//!
//! # Resolution priority (per value)
//!
//! 1. Command-line argument
//! 2. Environment variable (`STARLOAD_DATABASE_URL`)
//! 3. TOML config file
//! 4. Compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the database URL
pub const DATABASE_URL_ENV: &str = "STARLOAD_DATABASE_URL";

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "STARLOAD_CONFIG";

/// Rows per multi-row dimension insert
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; a file containing only `[ingest]` is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[database]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSection {
    /// sqlx SQLite URL, e.g. `sqlite:///var/lib/starload/star.db`
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub max_connections: Option<u32>,

    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
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
    "info".to_string()
}

/// Batch tuning (`[ingest]` section)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Maximum names per multi-row dimension insert
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Drop and recreate the star schema at the start of each batch.
    /// When false the schema must already exist.
    #[serde(default = "default_reset_schema")]
    pub reset_schema: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            reset_schema: true,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_reset_schema() -> bool {
    true
}

/// Explicit connection settings for the relational store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }

    /// Private in-memory database (tests, dry runs)
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// True for `sqlite::memory:` and `mode=memory` URLs.
    ///
    /// Every pooled connection to an in-memory database sees its own empty
    /// database, so callers must hold such a pool to a single connection.
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Filesystem path of a file-backed database, if any
    pub fn database_path(&self) -> Option<PathBuf> {
        if self.is_in_memory() {
            return None;
        }
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }

    /// Resolve connection settings from CLI, environment, TOML and defaults
    pub fn resolve(cli_url: Option<&str>, toml: &TomlConfig) -> Self {
        let url = if let Some(url) = cli_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            url
        } else if let Some(url) = toml.database.url.clone() {
            url
        } else {
            default_database_url()
        };

        let mut config = Self::new(url);
        if let Some(max) = toml.database.max_connections {
            config.max_connections = max.max(1);
        }
        if let Some(timeout) = toml.database.busy_timeout_ms {
            config.busy_timeout_ms = timeout;
        }
        config
    }
}

/// OS-dependent default database URL
pub fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|d| d.join("starload"))
        .unwrap_or_else(|| PathBuf::from("./starload_data"));
    format!("sqlite://{}", dir.join("starload.db").display())
}

/// Locate the TOML config file: explicit path, then `$STARLOAD_CONFIG`,
/// then `<config_dir>/starload/config.toml`.
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("starload").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load the TOML config file
///
/// A missing file is not an error: a warning is logged and defaults are
/// used. A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using defaults");
        return Ok(TomlConfig::default());
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(TomlConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: TomlConfig = toml::from_str(&content)?;
    if config.ingest.chunk_size == 0 {
        return Err(Error::Config(format!(
            "{}: ingest.chunk_size must be at least 1",
            path.display()
        )));
    }

    info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_detection() {
        assert!(ConnectionConfig::in_memory().is_in_memory());
        assert!(ConnectionConfig::new("sqlite:file:star?mode=memory&cache=shared").is_in_memory());
        assert!(!ConnectionConfig::new("sqlite:///tmp/star.db").is_in_memory());
    }

    #[test]
    fn test_database_path_strips_scheme_and_query() {
        let config = ConnectionConfig::new("sqlite:///tmp/star.db?mode=rwc");
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/star.db")));

        let relative = ConnectionConfig::new("sqlite:data/star.db");
        assert_eq!(relative.database_path(), Some(PathBuf::from("data/star.db")));

        assert_eq!(ConnectionConfig::in_memory().database_path(), None);
    }

    #[test]
    fn test_toml_sections_are_optional() {
        let config: TomlConfig = toml::from_str("[ingest]\nchunk_size = 50\n").unwrap();
        assert_eq!(config.ingest.chunk_size, 50);
        assert!(config.ingest.reset_schema);
        assert!(config.database.url.is_none());
        assert_eq!(config.logging.level, "info");
    }
}
