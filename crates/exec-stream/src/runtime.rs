//! Runtime trait for the two-phase create/start exec protocol
//!
//! A runtime is anything that can create an exec inside a running container,
//! start it and hand back a multiplexed byte stream, and report the exec's
//! status afterwards. The coordinator only ever talks to a runtime through
//! this trait.

use crate::error::RuntimeError;
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Boxed read half of an attached stream
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed write half of an attached stream
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Runtime-assigned identifier for a created exec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecHandle {
    id: String,
}

impl ExecHandle {
    /// Wrap a runtime exec id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The exec id
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ExecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Runtime ids are long hex strings; twelve characters are plenty for logs
        let short = self.id.get(..12).unwrap_or(&self.id);
        f.write_str(short)
    }
}

/// Parameters of the create call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateExecSpec {
    /// Command in exec form
    pub cmd: Vec<String>,
    /// Attach the process stdin
    pub attach_stdin: bool,
    /// Attach the process stdout
    pub attach_stdout: bool,
    /// Attach the process stderr
    pub attach_stderr: bool,
    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
}

/// Parameters of the start call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartExecSpec {
    /// Start without attaching to any stream
    pub detach: bool,
    /// Keep the connection writable for stdin
    pub stdin: bool,
}

/// Inspection record of an exec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecInspect {
    /// Exit code, `None` while not committed by the runtime
    #[serde(rename = "ExitCode")]
    pub exit_code: Option<i64>,
    /// Whether the runtime still reports the exec as running
    #[serde(rename = "Running", default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

/// The bidirectional channel returned by the start call
pub struct AttachedStream {
    /// Multiplexed output frames
    pub output: BoxReader,
    /// Process stdin, present when the exec was started with stdin attached
    pub input: Option<BoxWriter>,
}

impl AttachedStream {
    /// Create a stream from its halves
    pub fn new(output: BoxReader, input: Option<BoxWriter>) -> Self {
        Self { output, input }
    }

    /// A stream that ends immediately, as produced by a detached start
    pub fn empty() -> Self {
        Self {
            output: Box::pin(futures::io::empty()),
            input: None,
        }
    }
}

impl fmt::Debug for AttachedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedStream")
            .field("input", &self.input.is_some())
            .finish_non_exhaustive()
    }
}

/// A container runtime that implements the create/start/inspect exec protocol
#[async_trait]
pub trait ExecRuntime: Send + Sync + 'static {
    /// Create an exec in the given container
    async fn create_exec(
        &self,
        container: &str,
        spec: &CreateExecSpec,
    ) -> Result<ExecHandle, RuntimeError>;

    /// Start a created exec and attach to its multiplexed stream
    async fn start_exec(
        &self,
        exec: &ExecHandle,
        spec: &StartExecSpec,
    ) -> Result<AttachedStream, RuntimeError>;

    /// Query the current status of an exec
    async fn inspect_exec(&self, exec: &ExecHandle) -> Result<ExecInspect, RuntimeError>;
}

#[async_trait]
impl<R: ExecRuntime> ExecRuntime for std::sync::Arc<R> {
    async fn create_exec(
        &self,
        container: &str,
        spec: &CreateExecSpec,
    ) -> Result<ExecHandle, RuntimeError> {
        (**self).create_exec(container, spec).await
    }

    async fn start_exec(
        &self,
        exec: &ExecHandle,
        spec: &StartExecSpec,
    ) -> Result<AttachedStream, RuntimeError> {
        (**self).start_exec(exec, spec).await
    }

    async fn inspect_exec(&self, exec: &ExecHandle) -> Result<ExecInspect, RuntimeError> {
        (**self).inspect_exec(exec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_handle_display_is_short() {
        let handle = ExecHandle::new("0123456789abcdef0123");
        assert_eq!(handle.to_string(), "0123456789ab");
        assert_eq!(handle.id(), "0123456789abcdef0123");

        let short = ExecHandle::new("abc");
        assert_eq!(short.to_string(), "abc");
    }

    #[test]
    fn test_inspect_serializes_runtime_field_names() {
        let inspect = ExecInspect {
            exit_code: Some(0),
            running: None,
        };
        let json = serde_json::to_value(&inspect).unwrap();
        assert_eq!(json, serde_json::json!({ "ExitCode": 0 }));
    }
}
