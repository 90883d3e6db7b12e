//! Error types for leaselaw

use thiserror::Error;

/// Result type alias using LeaselawError
pub type Result<T> = std::result::Result<T, LeaselawError>;

/// Error type alias for convenience
pub type Error = LeaselawError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for leaselaw
#[derive(Debug, Error)]
pub enum LeaselawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External service error: {0}")]
    Service(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LeaselawError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
