//! Live access to an attached exec stream
//!
//! A live request skips aggregation. The caller receives a [`LiveHandle`],
//! picks where stdout and stderr should go, and from then on owns the stream:
//! it writes stdin, waits for the output to close and asks for the exit status
//! when it is ready.

use crate::config::RetryPolicy;
use crate::demux::demux;
use crate::error::{Error, Result};
use crate::poller::ExitStatusPoller;
use crate::result::ExitStatus;
use crate::runtime::{AttachedStream, BoxWriter, ExecHandle, ExecRuntime};
use crate::stdin::StdinHandle;
use futures::future::{BoxFuture, FutureExt};
use futures::io::AsyncWrite;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Destinations for live output; streams without a destination are discarded
#[derive(Default)]
pub struct LiveSinks {
    stdout: Option<BoxWriter>,
    stderr: Option<BoxWriter>,
}

impl LiveSinks {
    /// No destinations
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward stdout to a writer
    pub fn stdout<W: AsyncWrite + Send + 'static>(mut self, writer: W) -> Self {
        self.stdout = Some(Box::pin(writer));
        self
    }

    /// Forward stderr to a writer
    pub fn stderr<W: AsyncWrite + Send + 'static>(mut self, writer: W) -> Self {
        self.stderr = Some(Box::pin(writer));
        self
    }
}

/// A started exec waiting for the caller to choose output destinations
pub struct LiveHandle<R> {
    exec: ExecHandle,
    stream: AttachedStream,
    runtime: Arc<R>,
    policy: RetryPolicy,
}

impl<R> fmt::Debug for LiveHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveHandle")
            .field("exec", &self.exec)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<R: ExecRuntime> LiveHandle<R> {
    pub(crate) fn new(
        exec: ExecHandle,
        stream: AttachedStream,
        runtime: Arc<R>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            exec,
            stream,
            runtime,
            policy,
        }
    }

    /// The exec this handle belongs to
    pub fn exec(&self) -> &ExecHandle {
        &self.exec
    }

    /// Route output into the given sinks.
    ///
    /// Consumes the handle. Output only moves while [`LiveStream::closed`] or
    /// [`LiveStream::finish`] is being polled; a caller writing stdin should
    /// take it with [`LiveStream::take_stdin`] and write it concurrently with
    /// `closed()`, or a chatty process can block on a full output pipe.
    /// Passing no sinks is fine: the output is then read and discarded.
    pub fn attach(self, sinks: LiveSinks) -> LiveStream<R> {
        let AttachedStream { mut output, input } = self.stream;
        let LiveSinks {
            mut stdout,
            mut stderr,
        } = sinks;
        debug!(
            "attaching live exec {} (stdout: {}, stderr: {})",
            self.exec,
            stdout.is_some(),
            stderr.is_some()
        );

        let pump = async move {
            demux(&mut output, stdout.as_mut(), stderr.as_mut())
                .await
                .map(|_| ())
        }
        .boxed();

        LiveStream {
            exec: self.exec,
            stdin: input.map(StdinHandle::new),
            pump: Some(pump),
            runtime: self.runtime,
            policy: self.policy,
        }
    }
}

/// An exec stream forwarding into caller-supplied sinks
pub struct LiveStream<R> {
    exec: ExecHandle,
    stdin: Option<StdinHandle>,
    pump: Option<BoxFuture<'static, io::Result<()>>>,
    runtime: Arc<R>,
    policy: RetryPolicy,
}

impl<R> fmt::Debug for LiveStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStream")
            .field("exec", &self.exec)
            .field("stdin", &self.stdin.is_some())
            .field("closed", &self.pump.is_none())
            .finish_non_exhaustive()
    }
}

impl<R: ExecRuntime> LiveStream<R> {
    /// The exec this stream belongs to
    pub fn exec(&self) -> &ExecHandle {
        &self.exec
    }

    /// Take stdin to write it concurrently with [`LiveStream::closed`]
    ///
    /// Returns `None` if stdin was not attached or was already taken.
    pub fn take_stdin(&mut self) -> Option<StdinHandle> {
        self.stdin.take()
    }

    /// Returns true once the output has closed
    pub fn is_closed(&self) -> bool {
        self.pump.is_none()
    }

    /// Forward output until the stream closes.
    ///
    /// A stream error is returned once; after the stream closed this returns
    /// `Ok(())` immediately.
    pub async fn closed(&mut self) -> Result<()> {
        match self.pump.take() {
            Some(pump) => pump.await.map_err(Error::Stream),
            None => Ok(()),
        }
    }

    /// Close stdin, wait for the output to close and resolve the exit status
    pub async fn finish(mut self) -> Result<ExitStatus> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.close().await?;
        }
        self.closed().await?;
        ExitStatusPoller::new(&*self.runtime, self.policy)
            .resolve(&self.exec)
            .await
    }
}
