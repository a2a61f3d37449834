//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
