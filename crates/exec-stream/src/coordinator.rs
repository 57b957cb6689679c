//! The exec lifecycle driver
//!
//! [`ExecCoordinator`] runs one request through the whole protocol: create,
//! start, stdin feeding and demultiplexing in parallel, single-shot
//! completion, then exit status polling. Nothing is spawned; all of it is
//! driven from the future returned by [`ExecCoordinator::run`].

use crate::aggregator::{ClosingReader, CompletionAggregator, TerminalSignal};
use crate::config::{ExecConfig, RetryPolicy};
use crate::container::Container;
use crate::demux::demux;
use crate::error::{Error, Result};
use crate::live::LiveHandle;
use crate::poller::ExitStatusPoller;
use crate::request::ExecRequest;
use crate::result::ExecResult;
use crate::runtime::{AttachedStream, ExecHandle, ExecRuntime};
use crate::stdin::StdinHandle;
use futures::future::{self, Either};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a request produced
pub enum ExecOutcome<R> {
    /// The exec ran to completion
    Completed(ExecResult),
    /// The caller asked for the live stream
    Live(LiveHandle<R>),
}

impl<R> ExecOutcome<R> {
    /// The aggregated result, if the request was not live
    pub fn into_result(self) -> Option<ExecResult> {
        match self {
            ExecOutcome::Completed(result) => Some(result),
            ExecOutcome::Live(_) => None,
        }
    }

    /// The live handle, if the request was live
    pub fn into_live(self) -> Option<LiveHandle<R>> {
        match self {
            ExecOutcome::Completed(_) => None,
            ExecOutcome::Live(handle) => Some(handle),
        }
    }

    /// Returns true for a live outcome
    pub fn is_live(&self) -> bool {
        matches!(self, ExecOutcome::Live(_))
    }
}

impl<R> fmt::Debug for ExecOutcome<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Completed(result) => f.debug_tuple("Completed").field(result).finish(),
            ExecOutcome::Live(handle) => f.debug_tuple("Live").field(handle).finish(),
        }
    }
}

/// Drives exec requests against a runtime
pub struct ExecCoordinator<R> {
    runtime: Arc<R>,
    policy: RetryPolicy,
}

impl<R> Clone for ExecCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            policy: self.policy,
        }
    }
}

impl<R: ExecRuntime> ExecCoordinator<R> {
    /// Create a coordinator with the default retry policy
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            policy: RetryPolicy::default(),
        }
    }

    /// Create a coordinator from a configuration
    pub fn with_config(runtime: Arc<R>, config: &ExecConfig) -> Self {
        Self::new(runtime).with_retry_policy(config.retry)
    }

    /// Set the exit status retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The retry policy in use
    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The wrapped runtime
    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// A handle for running execs in one container
    pub fn container(&self, id: impl Into<String>) -> Container<R> {
        Container::new(self.clone(), id)
    }

    /// Run a request in a container.
    ///
    /// Create and start failures are returned as errors. Stream failures are
    /// reported inside the [`ExecResult`] together with whatever output was
    /// captured before the failure.
    pub async fn run(&self, container: &str, mut request: ExecRequest) -> Result<ExecOutcome<R>> {
        request.validate()?;

        let exec = self
            .runtime
            .create_exec(container, &request.create_spec())
            .await
            .map_err(|source| Error::Create {
                container: container.to_string(),
                source,
            })?;
        debug!(
            "created exec {} in container {}: {:?}",
            exec,
            container,
            request.command()
        );

        let stream = self
            .runtime
            .start_exec(&exec, &request.start_spec())
            .await
            .map_err(|source| Error::Start {
                exec_id: exec.id().to_string(),
                source,
            })?;
        debug!("started exec {} (detached: {})", exec, request.is_detached());

        if request.is_live() {
            return Ok(ExecOutcome::Live(LiveHandle::new(
                exec,
                stream,
                Arc::clone(&self.runtime),
                self.policy,
            )));
        }

        self.collect(exec, stream, &mut request)
            .await
            .map(ExecOutcome::Completed)
    }

    async fn collect(
        &self,
        exec: ExecHandle,
        stream: AttachedStream,
        request: &mut ExecRequest,
    ) -> Result<ExecResult> {
        let AttachedStream { output, input } = stream;

        // Without output there is no stream end to wait for once stdin is done.
        let mut aggregator = CompletionAggregator::new()
            .arm_stdin_exhaustion(request.wants_stdin() && !request.wants_output());
        let mut stdout = request.wants_stdout().then(|| aggregator.capture_stdout());
        let mut stderr = request.wants_stderr().then(|| aggregator.capture_stderr());

        let source = request.take_stdin_source();
        let feed_signaler = aggregator.signaler();
        let feed = async move {
            let Some(input) = input else {
                if source.is_some() {
                    warn!("runtime returned no stdin for exec, input is dropped");
                }
                return;
            };
            let mut stdin = StdinHandle::new(input);
            let fed = match source {
                Some(source) => stdin.feed(source).await,
                None => stdin.close().await.map(|()| 0),
            };
            match fed {
                Ok(written) => {
                    debug!("wrote {} bytes to stdin", written);
                    feed_signaler.signal(TerminalSignal::StdinExhausted);
                }
                Err(e) => {
                    warn!("failed to write stdin: {}", e);
                    feed_signaler.signal(TerminalSignal::Error(e));
                }
            }
        };

        let pump_signaler = aggregator.signaler();
        let mut reader = ClosingReader::new(output, aggregator.signaler());
        let pump = async move {
            // Detached and stdin-only streams are drained so the exec can finish.
            match demux(&mut reader, stdout.as_mut(), stderr.as_mut()).await {
                Ok(delivered) => {
                    debug!("stream ended after {} bytes of output", delivered);
                    pump_signaler.signal(TerminalSignal::End);
                }
                Err(e) => {
                    debug!("stream failed: {}", e);
                    pump_signaler.signal(TerminalSignal::Error(e));
                }
            }
        };

        let io = future::join(feed, pump);
        let wait = aggregator.wait();
        futures::pin_mut!(io, wait);
        let completion = match future::select(io, wait).await {
            Either::Left((_, wait)) => wait.await,
            Either::Right((completion, _)) => completion,
        };
        debug!("exec {} completed by {:?}", exec, completion.signal);

        let status = ExitStatusPoller::new(&*self.runtime, self.policy)
            .resolve(&exec)
            .await?;

        Ok(ExecResult {
            stdout: completion.stdout,
            stderr: completion.stderr,
            status,
            error: completion.error,
        })
    }
}
