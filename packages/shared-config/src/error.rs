//! Configuration error types

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid value for environment variable
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Duration string that does not follow the `<number><unit>` grammar
    #[error("invalid duration for {0}: '{1}' (expected e.g. 30s, 15m, 1h, 7d)")]
    InvalidDuration(String, String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
