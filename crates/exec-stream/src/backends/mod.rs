//! Runtime backends
//!
//! Built-in implementations of [`ExecRuntime`](crate::runtime::ExecRuntime).
//! Other runtimes can be plugged in by implementing the trait directly; the
//! coordinator never looks past it.
//!
//! # Example: Custom Runtime
//!
//! ```ignore
//! use exec_stream::runtime::{AttachedStream, CreateExecSpec, ExecHandle, ExecInspect, ExecRuntime, StartExecSpec};
//! use exec_stream::RuntimeError;
//! use async_trait::async_trait;
//!
//! struct MyRuntime;
//!
//! #[async_trait]
//! impl ExecRuntime for MyRuntime {
//!     async fn create_exec(&self, container: &str, spec: &CreateExecSpec) -> Result<ExecHandle, RuntimeError> {
//!         // Ask the runtime for a new exec
//!     }
//!
//!     // start_exec and inspect_exec follow the same shape
//! }
//! ```

#[cfg(feature = "docker")]
pub mod docker;
#[cfg(feature = "docker")]
pub use docker::DockerRuntime;
