//! Exec requests
//!
//! [`ExecRequest`] is the fully normalized input of the coordinator. It is
//! built with [`ExecRequestBuilder`] or mapped from an [`ExecOptions`] object,
//! and validated once at construction.

use crate::error::{Error, Result};
use crate::runtime::{CreateExecSpec, StartExecSpec};
use async_channel::Receiver;
use futures::io::AsyncRead;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Input fed into the exec's stdin
pub enum StdinSource {
    /// A fixed payload, written once and then closed
    Bytes(Vec<u8>),
    /// A reader copied until its end
    Reader(Pin<Box<dyn AsyncRead + Send>>),
    /// Chunks forwarded until the channel is closed
    Channel(Receiver<Vec<u8>>),
}

impl StdinSource {
    /// Feed stdin from a reader
    pub fn reader<R: AsyncRead + Send + 'static>(reader: R) -> Self {
        StdinSource::Reader(Box::pin(reader))
    }
}

impl fmt::Debug for StdinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdinSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            StdinSource::Reader(_) => f.write_str("Reader"),
            StdinSource::Channel(_) => f.write_str("Channel"),
        }
    }
}

impl From<Vec<u8>> for StdinSource {
    fn from(bytes: Vec<u8>) -> Self {
        StdinSource::Bytes(bytes)
    }
}

impl From<&[u8]> for StdinSource {
    fn from(bytes: &[u8]) -> Self {
        StdinSource::Bytes(bytes.to_vec())
    }
}

impl From<String> for StdinSource {
    fn from(text: String) -> Self {
        StdinSource::Bytes(text.into_bytes())
    }
}

impl From<&str> for StdinSource {
    fn from(text: &str) -> Self {
        StdinSource::Bytes(text.as_bytes().to_vec())
    }
}

impl From<Receiver<Vec<u8>>> for StdinSource {
    fn from(channel: Receiver<Vec<u8>>) -> Self {
        StdinSource::Channel(channel)
    }
}

/// A normalized exec request
#[derive(Debug)]
pub struct ExecRequest {
    command: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
    want_stdin: bool,
    want_stdout: bool,
    want_stderr: bool,
    live: bool,
    stdin_source: Option<StdinSource>,
}

impl ExecRequest {
    /// Start building a request for a command in exec form
    pub fn builder<I, S>(command: I) -> ExecRequestBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExecRequestBuilder::new(command)
    }

    /// Map an options object onto a request
    pub fn from_options<I, S>(command: I, options: ExecOptions) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = Self::builder(command)
            .stdout(options.stdout)
            .stderr(options.stderr)
            .live(options.live);
        builder = match options.stdin {
            Some(StdinOption::Attach(attach)) => builder.attach_stdin(attach),
            Some(StdinOption::Text(text)) => builder.stdin(text),
            None => builder,
        };
        builder.build()
    }

    /// The command in exec form
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Whether stdin is attached
    pub fn wants_stdin(&self) -> bool {
        self.want_stdin
    }

    /// Whether stdout is attached
    pub fn wants_stdout(&self) -> bool {
        self.want_stdout
    }

    /// Whether stderr is attached
    pub fn wants_stderr(&self) -> bool {
        self.want_stderr
    }

    /// Whether any output stream is attached
    pub fn wants_output(&self) -> bool {
        self.want_stdout || self.want_stderr
    }

    /// Whether the request is detached from every stream
    pub fn is_detached(&self) -> bool {
        !(self.want_stdin || self.want_stdout || self.want_stderr)
    }

    /// Whether the caller wants the live stream instead of a result
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Take the stdin source, if any
    pub fn take_stdin_source(&mut self) -> Option<StdinSource> {
        self.stdin_source.take()
    }

    /// Check the request invariants
    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(Error::configuration("command must not be empty"));
        }
        if self.live && self.is_detached() {
            return Err(Error::configuration(
                "live mode requires stdin, stdout or stderr to be attached",
            ));
        }
        Ok(())
    }

    /// Parameters of the create call, attach flags mirroring the request
    pub fn create_spec(&self) -> CreateExecSpec {
        CreateExecSpec {
            cmd: self.command.clone(),
            attach_stdin: self.want_stdin,
            attach_stdout: self.want_stdout,
            attach_stderr: self.want_stderr,
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
        }
    }

    /// Parameters of the start call
    pub fn start_spec(&self) -> StartExecSpec {
        StartExecSpec {
            detach: self.is_detached(),
            stdin: self.want_stdin,
        }
    }
}

/// Builder for [`ExecRequest`]
#[derive(Debug)]
pub struct ExecRequestBuilder {
    request: ExecRequest,
}

impl ExecRequestBuilder {
    fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            request: ExecRequest {
                command: command.into_iter().map(Into::into).collect(),
                env: Vec::new(),
                working_dir: None,
                want_stdin: false,
                want_stdout: false,
                want_stderr: false,
                live: false,
                stdin_source: None,
            },
        }
    }

    /// Capture stdout
    pub fn stdout(mut self, enable: bool) -> Self {
        self.request.want_stdout = enable;
        self
    }

    /// Capture stderr
    pub fn stderr(mut self, enable: bool) -> Self {
        self.request.want_stderr = enable;
        self
    }

    /// Attach stdin without a source; in live mode the caller writes it
    pub fn attach_stdin(mut self, enable: bool) -> Self {
        self.request.want_stdin = enable;
        if !enable {
            self.request.stdin_source = None;
        }
        self
    }

    /// Attach stdin and feed it from a source
    pub fn stdin(mut self, source: impl Into<StdinSource>) -> Self {
        self.request.want_stdin = true;
        self.request.stdin_source = Some(source.into());
        self
    }

    /// Hand back the live stream instead of an aggregated result
    pub fn live(mut self, enable: bool) -> Self {
        self.request.live = enable;
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.request
            .env
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.request.working_dir = Some(dir.into());
        self
    }

    /// Validate and build the request
    pub fn build(self) -> Result<ExecRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

/// The stdin option of an options object: a flag or a text payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StdinOption {
    /// Attach stdin without feeding it
    Attach(bool),
    /// Attach stdin and feed it this text
    Text(String),
}

/// Options object accepted by [`crate::Container::exec_with`].
///
/// Absent fields default to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// Stdin flag or payload
    pub stdin: Option<StdinOption>,
    /// Capture stdout
    pub stdout: bool,
    /// Capture stderr
    pub stderr: bool,
    /// Return a live handle
    pub live: bool,
}
