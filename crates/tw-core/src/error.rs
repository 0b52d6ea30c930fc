//! Error types for tw-core

use thiserror::Error;

/// Core error type for Tidewater
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Circular dependency detected
    #[error("[E002] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E003: Failed to parse configuration file
    #[error("[E003] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E004: Invalid configuration value
    #[error("[E004] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E005: Invalid action name pattern
    #[error("[E005] Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// E006: Two actions write the same target
    #[error("[E006] Duplicate action target: {target}")]
    DuplicateTarget { target: String },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E015: YAML parse error
    #[error("[E015] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
