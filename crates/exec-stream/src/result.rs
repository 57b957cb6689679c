//! Exec results

use crate::error::Error;
use serde::{Serialize, Serializer};

/// Final status of an exec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExitStatus {
    /// Exit code, `None` if the runtime never committed one
    #[serde(rename = "ExitCode")]
    pub exit_code: Option<i64>,
    /// Extra status polls that were needed, only set when nonzero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl ExitStatus {
    /// Returns true if the exec exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Returns true if the runtime has not committed an exit code
    pub fn is_pending(&self) -> bool {
        self.exit_code.is_none()
    }

    /// Number of extra status polls
    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(0)
    }
}

/// The aggregated outcome of a non-live exec
#[derive(Debug, Serialize)]
pub struct ExecResult {
    /// Captured stdout, present only when stdout was requested
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lossy"
    )]
    pub stdout: Option<Vec<u8>>,
    /// Captured stderr, present only when stderr was requested
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lossy"
    )]
    pub stderr: Option<Vec<u8>>,
    /// Final exit status
    #[serde(rename = "inspect")]
    pub status: ExitStatus,
    /// Stream error that ended the exec early, if any
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_error"
    )]
    pub error: Option<Error>,
}

impl ExecResult {
    /// Stdout as text, replacing invalid UTF-8
    pub fn stdout_lossy(&self) -> Option<String> {
        self.stdout
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Stderr as text, replacing invalid UTF-8
    pub fn stderr_lossy(&self) -> Option<String> {
        self.stderr
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns true if the exec exited with code 0 and the stream did not fail
    pub fn success(&self) -> bool {
        self.error.is_none() && self.status.success()
    }
}

fn serialize_lossy<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

fn serialize_error<S: Serializer>(error: &Option<Error>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}
