//! Container handles exposing the exec entry points
//!
//! A [`Container`] pairs a coordinator with a container id. It is the
//! caller-facing surface: an awaitable `exec`, an options-object variant, and a
//! continuation-style adapter for callers that prefer callbacks.

use crate::coordinator::{ExecCoordinator, ExecOutcome};
use crate::error::{Error, Result};
use crate::request::{ExecOptions, ExecRequest};
use crate::result::ExecResult;
use crate::runtime::ExecRuntime;

/// A container that execs can be run in
pub struct Container<R> {
    id: String,
    coordinator: ExecCoordinator<R>,
}

impl<R> Clone for Container<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<R: ExecRuntime> Container<R> {
    /// Create a handle for a container
    pub fn new(coordinator: ExecCoordinator<R>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coordinator,
        }
    }

    /// The container id or name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run a request
    pub async fn exec(&self, request: ExecRequest) -> Result<ExecOutcome<R>> {
        self.coordinator.run(&self.id, request).await
    }

    /// Run a command with an options object
    pub async fn exec_with<I, S>(&self, command: I, options: ExecOptions) -> Result<ExecOutcome<R>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ExecRequest::from_options(command, options)?;
        self.exec(request).await
    }

    /// Run a command capturing stdout and stderr
    pub async fn output<I, S>(&self, command: I) -> Result<ExecResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ExecRequest::builder(command)
            .stdout(true)
            .stderr(true)
            .build()?;
        self.exec(request)
            .await?
            .into_result()
            .ok_or_else(|| Error::configuration("non-live request produced a live stream"))
    }

    /// Run a request and hand the outcome to a callback.
    ///
    /// The callback is invoked exactly once, with either the outcome or the
    /// error. The returned future drives the exec and must be polled (awaited
    /// or spawned) for anything to happen.
    pub async fn exec_then<F>(&self, request: Result<ExecRequest>, callback: F)
    where
        F: FnOnce(Result<ExecOutcome<R>>),
    {
        let outcome = match request {
            Ok(request) => self.exec(request).await,
            Err(e) => Err(e),
        };
        callback(outcome);
    }
}
