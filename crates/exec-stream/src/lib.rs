//! Exec-stream orchestration for container runtimes
//!
//! This crate runs commands inside running containers through the two-phase
//! create/start exec protocol. It demultiplexes the attached stream into
//! stdout and stderr, feeds stdin, merges the racing end-of-stream conditions
//! into a single completion and resolves the exit status, retrying while the
//! runtime has not committed it yet.
//!
//! The core is runtime-agnostic: everything is driven by the future returned
//! from [`Container::exec`], and backends implement [`ExecRuntime`].

#![warn(missing_docs)]

pub mod aggregator;
pub mod backends;
pub mod config;
pub mod container;
pub mod coordinator;
pub mod demux;
pub mod error;
pub mod live;
pub mod poller;
pub mod request;
pub mod result;
pub mod runtime;
pub mod stdin;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use aggregator::{Completion, CompletionAggregator, SignalKind, TerminalSignal};
pub use config::{ExecConfig, RetryPolicy};
pub use container::Container;
pub use coordinator::{ExecCoordinator, ExecOutcome};
pub use error::{Error, Result, RuntimeError};
pub use live::{LiveHandle, LiveSinks, LiveStream};
pub use poller::ExitStatusPoller;
pub use request::{ExecOptions, ExecRequest, ExecRequestBuilder, StdinOption, StdinSource};
pub use result::{ExecResult, ExitStatus};
pub use runtime::{AttachedStream, ExecHandle, ExecRuntime};
pub use stdin::StdinHandle;

#[cfg(feature = "docker")]
pub use backends::DockerRuntime;
