//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_response_timeout_ms() -> u64 {
    5_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_slice_size() -> usize {
    244
}

fn default_reassembly_limit() -> usize {
    64 * 1024
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Timeouts and limits for one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// How long a sent request may wait for its response.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// How long each handshake step may wait for its response.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Slice size used until the device negotiates one.
    #[serde(default = "default_slice_size")]
    pub default_slice_size: usize,
    /// Largest packet the reassembler accepts.
    #[serde(default = "default_reassembly_limit")]
    pub reassembly_limit: usize,
    /// Timeout poll period of the async driver.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            response_timeout_ms: default_response_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            default_slice_size: default_slice_size(),
            reassembly_limit: default_reassembly_limit(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::invalid("response_timeout_ms", "must be positive"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::invalid("handshake_timeout_ms", "must be positive"));
        }
        if self.default_slice_size == 0 {
            return Err(ConfigError::invalid("default_slice_size", "must be positive"));
        }
        if self.reassembly_limit < self.default_slice_size {
            return Err(ConfigError::invalid(
                "reassembly_limit",
                "must not be smaller than default_slice_size",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
