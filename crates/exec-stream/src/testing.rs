//! In-memory runtime for tests
//!
//! [`ScriptedRuntime`] plays back a scripted output stream and a queue of exit
//! codes, and records every call made against it.

use crate::demux::{StreamKind, encode_frame};
use crate::error::RuntimeError;
use crate::runtime::{
    AttachedStream, BoxReader, BoxWriter, CreateExecSpec, ExecHandle, ExecInspect, ExecRuntime,
    StartExecSpec,
};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, Cursor};
use futures::stream::{StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

/// Writer that forwards every write as a chunk on a channel
#[derive(Debug)]
pub struct ChannelWriter {
    tx: Sender<Vec<u8>>,
}

impl ChannelWriter {
    /// Create a writer and the receiving end of its chunks
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.tx.try_send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdin receiver closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}

/// Reader that fails every read
struct FailingReader {
    kind: io::ErrorKind,
    message: String,
}

impl AsyncRead for FailingReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut [u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(self.kind, self.message.clone())))
    }
}

/// Writer that fails every write
struct FailingWriter {
    message: String,
}

impl AsyncWrite for FailingWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, self.message.clone())))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Reader that never produces data nor ends
struct PendingReader;

impl AsyncRead for PendingReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut [u8]) -> Poll<io::Result<usize>> {
        Poll::Pending
    }
}

/// How the output stream behaves after the scripted frames
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ending {
    Eof,
    Error(String),
    Hang,
}

#[derive(Debug, Clone)]
enum OutputScript {
    Frames {
        frames: Vec<(StreamKind, Vec<u8>)>,
        ending: Ending,
    },
    /// Stdin chunks are echoed back as stdout frames, like `cat` or `tee`
    Echo,
}

/// A scripted [`ExecRuntime`]
#[derive(Debug)]
pub struct ScriptedRuntime {
    output: OutputScript,
    exit_codes: Mutex<VecDeque<Option<i64>>>,
    fail_create: Option<String>,
    fail_start: Option<String>,
    fail_inspect: Option<String>,
    fail_stdin: Option<String>,
    create_calls: AtomicUsize,
    start_calls: AtomicUsize,
    inspect_calls: AtomicUsize,
    created: Mutex<Vec<CreateExecSpec>>,
    started: Mutex<Vec<StartExecSpec>>,
    stdin_chunks: Mutex<Option<Receiver<Vec<u8>>>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    /// A runtime whose execs print nothing and exit 0
    pub fn new() -> Self {
        Self {
            output: OutputScript::Frames {
                frames: Vec::new(),
                ending: Ending::Eof,
            },
            exit_codes: Mutex::new(VecDeque::new()),
            fail_create: None,
            fail_start: None,
            fail_inspect: None,
            fail_stdin: None,
            create_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            inspect_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            stdin_chunks: Mutex::new(None),
        }
    }

    fn push_frame(mut self, kind: StreamKind, payload: &[u8]) -> Self {
        match &mut self.output {
            OutputScript::Frames { frames, .. } => frames.push((kind, payload.to_vec())),
            OutputScript::Echo => {
                self.output = OutputScript::Frames {
                    frames: vec![(kind, payload.to_vec())],
                    ending: Ending::Eof,
                }
            }
        }
        self
    }

    fn set_ending(mut self, end: Ending) -> Self {
        if let OutputScript::Frames { ending, .. } = &mut self.output {
            *ending = end;
        }
        self
    }

    /// Emit a stdout frame
    pub fn stdout(self, payload: impl AsRef<[u8]>) -> Self {
        self.push_frame(StreamKind::Stdout, payload.as_ref())
    }

    /// Emit a stderr frame
    pub fn stderr(self, payload: impl AsRef<[u8]>) -> Self {
        self.push_frame(StreamKind::Stderr, payload.as_ref())
    }

    /// Emit a frame of any kind
    pub fn frame(self, kind: StreamKind, payload: impl AsRef<[u8]>) -> Self {
        self.push_frame(kind, payload.as_ref())
    }

    /// Fail the stream after the scripted frames
    pub fn fail_stream(self, message: impl Into<String>) -> Self {
        self.set_ending(Ending::Error(message.into()))
    }

    /// Keep the stream open forever after the scripted frames
    pub fn hang(self) -> Self {
        self.set_ending(Ending::Hang)
    }

    /// Echo stdin back as stdout
    pub fn echo_stdin(mut self) -> Self {
        self.output = OutputScript::Echo;
        self
    }

    /// Exit codes returned by successive inspect calls; `Some(0)` once drained
    pub fn exit_codes(self, codes: impl IntoIterator<Item = Option<i64>>) -> Self {
        self.exit_codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(codes);
        self
    }

    /// Reject the create call
    pub fn fail_create(mut self, message: impl Into<String>) -> Self {
        self.fail_create = Some(message.into());
        self
    }

    /// Reject the start call
    pub fn fail_start(mut self, message: impl Into<String>) -> Self {
        self.fail_start = Some(message.into());
        self
    }

    /// Reject inspect calls
    pub fn fail_inspect(mut self, message: impl Into<String>) -> Self {
        self.fail_inspect = Some(message.into());
        self
    }

    /// Fail every write to stdin
    pub fn fail_stdin(mut self, message: impl Into<String>) -> Self {
        self.fail_stdin = Some(message.into());
        self
    }

    /// Number of create calls
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of start calls
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of inspect calls
    pub fn inspect_calls(&self) -> usize {
        self.inspect_calls.load(Ordering::SeqCst)
    }

    /// Specs passed to create calls
    pub fn created(&self) -> Vec<CreateExecSpec> {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Specs passed to start calls
    pub fn started(&self) -> Vec<StartExecSpec> {
        self.started.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bytes written to stdin so far (scripted output mode only)
    pub fn stdin_written(&self) -> Vec<u8> {
        let guard = self.stdin_chunks.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = Vec::new();
        if let Some(rx) = guard.as_ref() {
            while let Ok(chunk) = rx.try_recv() {
                written.extend_from_slice(&chunk);
            }
        }
        written
    }

    fn scripted_output(frames: &[(StreamKind, Vec<u8>)], ending: &Ending) -> BoxReader {
        let bytes: Vec<u8> = frames
            .iter()
            .flat_map(|(kind, payload)| encode_frame(*kind, payload))
            .collect();
        let frames = Cursor::new(bytes);
        match ending {
            Ending::Eof => Box::pin(frames),
            Ending::Error(message) => Box::pin(frames.chain(FailingReader {
                kind: io::ErrorKind::ConnectionReset,
                message: message.clone(),
            })),
            Ending::Hang => Box::pin(frames.chain(PendingReader)),
        }
    }
}

#[async_trait]
impl ExecRuntime for ScriptedRuntime {
    async fn create_exec(
        &self,
        _container: &str,
        spec: &CreateExecSpec,
    ) -> Result<ExecHandle, RuntimeError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_create {
            return Err(message.clone().into());
        }
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());
        Ok(ExecHandle::new(format!("scripted-exec-{n:04}")))
    }

    async fn start_exec(
        &self,
        _exec: &ExecHandle,
        spec: &StartExecSpec,
    ) -> Result<AttachedStream, RuntimeError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_start {
            return Err(message.clone().into());
        }
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*spec);

        let (writer, chunks) = ChannelWriter::new();
        let stream = match &self.output {
            OutputScript::Frames { frames, ending } => {
                *self.stdin_chunks.lock().unwrap_or_else(|e| e.into_inner()) = Some(chunks);
                AttachedStream::new(Self::scripted_output(frames, ending), None)
            }
            OutputScript::Echo => {
                let echoed = Box::pin(
                    chunks.map(|chunk| Ok::<_, io::Error>(encode_frame(StreamKind::Stdout, &chunk))),
                )
                .into_async_read();
                AttachedStream::new(Box::pin(echoed), None)
            }
        };

        let input = spec.stdin.then(|| match &self.fail_stdin {
            Some(message) => Box::pin(FailingWriter {
                message: message.clone(),
            }) as BoxWriter,
            None => Box::pin(writer) as BoxWriter,
        });
        Ok(AttachedStream { input, ..stream })
    }

    async fn inspect_exec(&self, _exec: &ExecHandle) -> Result<ExecInspect, RuntimeError> {
        self.inspect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_inspect {
            return Err(message.clone().into());
        }
        let exit_code = self
            .exit_codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Some(0));
        Ok(ExecInspect {
            exit_code,
            running: Some(exit_code.is_none()),
        })
    }
}
