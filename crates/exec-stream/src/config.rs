//! Configuration structures for exec orchestration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of extra status polls
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default delay between status polls, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Exec orchestration configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Exit status polling
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ExecConfig {
    /// Parse a configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config_load(path.display().to_string(), e.to_string()))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::config_load(path.display().to_string(), e.to_string()))
    }
}

/// How long to keep polling for an exit code the runtime has not committed yet.
///
/// Some runtimes report an exec as still running for a short while after its
/// output stream closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra inspection calls after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between inspection calls, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay between inspection calls
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}
