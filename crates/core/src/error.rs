//! Error types shared by the demo crates.

use thiserror::Error;

/// Error type for configuration and startup.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration files
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration values that parse but make no sense
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the demos' Error type.
pub type Result<T> = std::result::Result<T, Error>;
