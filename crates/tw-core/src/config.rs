//! Configuration types and parsing for tidewater.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "tidewater.yml";

const DEFAULT_DB_PATH: &str = ":memory:";

/// Main project configuration from tidewater.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Warehouse type identifier
    #[serde(default = "default_warehouse")]
    pub warehouse: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Directory holding run results and cache state
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Runner tuning
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Project-level default for run caching
    #[serde(default)]
    pub use_run_cache: bool,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database path (for DuckDB file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Number of sessions actions may lease concurrently
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
        }
    }
}

/// Runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Retries after the first failed attempt of a dataset or assertion task
    #[serde(default)]
    pub action_retry_limit: u32,

    /// Delay before each retry
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Minimum interval between progress notifications
    #[serde(default = "default_notification_period_ms")]
    pub notification_period_ms: u64,

    /// Prefix for warehouse job identifiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_prefix: Option<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            action_retry_limit: 0,
            retry_backoff_ms: 0,
            notification_period_ms: default_notification_period_ms(),
            job_prefix: None,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn notification_period(&self) -> Duration {
        Duration::from_millis(self.notification_period_ms)
    }
}

fn default_warehouse() -> String {
    "duckdb".to_string()
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_notification_period_ms() -> u64 {
    5000
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        Self::load(&dir.join(CONFIG_FILE))
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.database.pool_size == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "database.pool_size must be at least 1".to_string(),
            });
        }

        if self.warehouse != "duckdb" {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "Unsupported warehouse '{}'. Supported: duckdb",
                    self.warehouse
                ),
            });
        }

        Ok(())
    }

    /// Get absolute target path relative to a project root
    pub fn target_path_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.target_path)
    }

    /// Resolve the database path relative to a project root.
    ///
    /// `:memory:` and absolute paths are returned unchanged.
    pub fn database_path(&self, root: &Path) -> String {
        let path = &self.database.path;
        if path == DEFAULT_DB_PATH || Path::new(path).is_absolute() {
            path.clone()
        } else {
            root.join(path).display().to_string()
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
