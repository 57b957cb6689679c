//! Error types for exec orchestration

use thiserror::Error;

/// Error reported by a runtime backend.
///
/// Backends are free to use their own error types; the coordinator wraps them
/// into [`Error::Create`], [`Error::Start`] or [`Error::Inspect`] with context.
pub type RuntimeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for exec orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// The request is malformed and was rejected before reaching the runtime
    #[error("invalid exec request: {reason}")]
    Configuration {
        /// Why the request was rejected
        reason: String,
    },

    /// The runtime refused to create the exec
    #[error("failed to create exec in container {container}: {source}")]
    Create {
        /// The container the exec was meant to run in
        container: String,
        /// The runtime's error
        #[source]
        source: RuntimeError,
    },

    /// The runtime refused to start the exec
    #[error("failed to start exec {exec_id}: {source}")]
    Start {
        /// The exec that failed to start
        exec_id: String,
        /// The runtime's error
        #[source]
        source: RuntimeError,
    },

    /// Querying the exec status failed
    #[error("failed to inspect exec {exec_id}: {source}")]
    Inspect {
        /// The exec being inspected
        exec_id: String,
        /// The runtime's error
        #[source]
        source: RuntimeError,
    },

    /// The attached stream failed mid-execution
    #[error("exec stream error: {0}")]
    Stream(#[source] std::io::Error),

    /// A configuration file could not be loaded
    #[error("failed to load config from {path}: {reason}")]
    ConfigLoad {
        /// Path of the configuration file
        path: String,
        /// What went wrong
        reason: String,
    },

    /// YAML parse error
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a config load error
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error happened before the runtime was contacted
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::Create {
            container: "web".to_string(),
            source: "no such container".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to create exec in container web: no such container"
        );

        let err = Error::configuration("command must not be empty");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "invalid exec request: command must not be empty"
        );
    }
}
