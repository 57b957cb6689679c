//! Single-shot completion of an attached exec stream
//!
//! An attached stream can finish in several ways that race each other: the
//! output reaches its end, the stream is released, a read or write fails, or
//! (for stdin-only execs) the input runs dry. [`CompletionAggregator`] turns
//! all of them into exactly one [`Completion`]: the first armed signal wins and
//! every later one is discarded.

use crate::error::Error;
use async_channel::{Receiver, Sender};
use futures::io::{AsyncRead, AsyncWrite};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tracing::{debug, trace};

/// A terminal condition observed on an attached stream
#[derive(Debug)]
pub enum TerminalSignal {
    /// The output reached a clean end
    End,
    /// The stream was released
    Close,
    /// Reading or writing the stream failed
    Error(io::Error),
    /// The stdin source was fully written and closed
    StdinExhausted,
}

impl TerminalSignal {
    /// The kind of this signal, without its payload
    pub fn kind(&self) -> SignalKind {
        match self {
            TerminalSignal::End => SignalKind::End,
            TerminalSignal::Close => SignalKind::Close,
            TerminalSignal::Error(_) => SignalKind::Error,
            TerminalSignal::StdinExhausted => SignalKind::StdinExhausted,
        }
    }
}

/// Kind of a terminal signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// See [`TerminalSignal::End`]
    End,
    /// See [`TerminalSignal::Close`]
    Close,
    /// See [`TerminalSignal::Error`]
    Error,
    /// See [`TerminalSignal::StdinExhausted`]
    StdinExhausted,
}

/// The merged outcome of a stream, produced once per request
#[derive(Debug)]
pub struct Completion {
    /// Captured stdout, present when stdout was captured
    pub stdout: Option<Vec<u8>>,
    /// Captured stderr, present when stderr was captured
    pub stderr: Option<Vec<u8>>,
    /// Stream error, if the winning signal was an error
    pub error: Option<Error>,
    /// Which signal completed the stream
    pub signal: SignalKind,
}

/// An in-memory sink shared between the demultiplexer and the aggregator
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the buffered bytes, leaving the buffer empty
    pub fn take(&self) -> Vec<u8> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Handle used by stream tasks to report terminal signals
#[derive(Debug, Clone)]
pub struct Signaler {
    tx: Sender<TerminalSignal>,
    fired: Arc<AtomicBool>,
    stdin_armed: bool,
}

impl Signaler {
    /// Report a terminal signal.
    ///
    /// Returns true if this signal completed the stream. Signals that are not
    /// armed, or that arrive after the stream already completed, are dropped.
    pub fn signal(&self, signal: TerminalSignal) -> bool {
        let kind = signal.kind();
        if kind == SignalKind::StdinExhausted && !self.stdin_armed {
            trace!(?kind, "ignoring unarmed signal");
            return false;
        }
        if self.fired.swap(true, Ordering::AcqRel) {
            trace!(?kind, "discarding signal after completion");
            return false;
        }
        debug!(?kind, "stream completed");
        // Capacity is one and only the winner sends, so this cannot be full.
        self.tx.try_send(signal).is_ok()
    }

    /// Returns true once a signal has won
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Collects terminal signals and captured output into one [`Completion`]
#[derive(Debug)]
pub struct CompletionAggregator {
    signaler: Signaler,
    rx: Receiver<TerminalSignal>,
    stdout: Option<SharedBuffer>,
    stderr: Option<SharedBuffer>,
}

impl CompletionAggregator {
    /// Create an aggregator with stream end, close and error armed
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(1);
        Self {
            signaler: Signaler {
                tx,
                fired: Arc::new(AtomicBool::new(false)),
                stdin_armed: false,
            },
            rx,
            stdout: None,
            stderr: None,
        }
    }

    /// Also complete when the stdin source is exhausted
    pub fn arm_stdin_exhaustion(mut self, armed: bool) -> Self {
        self.signaler.stdin_armed = armed;
        self
    }

    /// A handle for reporting signals
    pub fn signaler(&self) -> Signaler {
        self.signaler.clone()
    }

    /// Capture stdout into a buffer finalized at completion
    pub fn capture_stdout(&mut self) -> SharedBuffer {
        self.stdout.get_or_insert_with(SharedBuffer::new).clone()
    }

    /// Capture stderr into a buffer finalized at completion
    pub fn capture_stderr(&mut self) -> SharedBuffer {
        self.stderr.get_or_insert_with(SharedBuffer::new).clone()
    }

    /// Wait for the first terminal signal and finalize the captured output
    pub async fn wait(self) -> Completion {
        let Self {
            signaler,
            rx,
            stdout,
            stderr,
        } = self;
        drop(signaler);

        // Every signaler dropped without reporting means the stream was released.
        let signal = rx.recv().await.unwrap_or(TerminalSignal::Close);
        let kind = signal.kind();
        let error = match signal {
            TerminalSignal::Error(e) => Some(Error::Stream(e)),
            _ => None,
        };

        Completion {
            stdout: stdout.map(|buffer| buffer.take()),
            stderr: stderr.map(|buffer| buffer.take()),
            error,
            signal: kind,
        }
    }
}

impl Default for CompletionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader that reports [`TerminalSignal::Close`] when it is released
pub struct ClosingReader<R> {
    inner: R,
    signaler: Signaler,
}

impl<R> ClosingReader<R> {
    /// Wrap a reader
    pub fn new(inner: R, signaler: Signaler) -> Self {
        Self { inner, signaler }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ClosingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<R> Drop for ClosingReader<R> {
    fn drop(&mut self) {
        self.signaler.signal(TerminalSignal::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::{AsyncReadExt, AsyncWriteExt, Cursor};

    #[test]
    fn test_first_signal_wins() {
        futures::executor::block_on(async {
            let aggregator = CompletionAggregator::new();
            let signaler = aggregator.signaler();

            assert!(signaler.signal(TerminalSignal::End));
            assert!(!signaler.signal(TerminalSignal::Close));
            assert!(!signaler.signal(TerminalSignal::Error(io::Error::other("late"))));

            let completion = aggregator.wait().await;
            assert_eq!(completion.signal, SignalKind::End);
            assert!(completion.error.is_none());
        });
    }

    #[test]
    fn test_stdin_exhaustion_ignored_unless_armed() {
        futures::executor::block_on(async {
            let aggregator = CompletionAggregator::new();
            let signaler = aggregator.signaler();

            assert!(!signaler.signal(TerminalSignal::StdinExhausted));
            assert!(!signaler.is_fired());
            assert!(signaler.signal(TerminalSignal::Close));

            let completion = aggregator.wait().await;
            assert_eq!(completion.signal, SignalKind::Close);

            let armed = CompletionAggregator::new().arm_stdin_exhaustion(true);
            assert!(armed.signaler().signal(TerminalSignal::StdinExhausted));
            assert_eq!(armed.wait().await.signal, SignalKind::StdinExhausted);
        });
    }

    #[test]
    fn test_error_keeps_buffered_output() {
        futures::executor::block_on(async {
            let mut aggregator = CompletionAggregator::new();
            let mut stdout = aggregator.capture_stdout();
            let signaler = aggregator.signaler();

            stdout.write_all(b"abc").await.unwrap();
            signaler.signal(TerminalSignal::Error(io::Error::other("connection reset")));

            let completion = aggregator.wait().await;
            assert_eq!(completion.stdout.as_deref(), Some(&b"abc"[..]));
            assert!(completion.stderr.is_none());
            assert!(matches!(completion.error, Some(Error::Stream(_))));
        });
    }

    #[test]
    fn test_dropped_signalers_complete_as_close() {
        futures::executor::block_on(async {
            let aggregator = CompletionAggregator::new();
            drop(aggregator.signaler());
            assert_eq!(aggregator.wait().await.signal, SignalKind::Close);
        });
    }

    #[test]
    fn test_end_then_close_completes_once() {
        futures::executor::block_on(async {
            let aggregator = CompletionAggregator::new();
            let signaler = aggregator.signaler();
            let mut reader = ClosingReader::new(Cursor::new(b"data".to_vec()), aggregator.signaler());

            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            assert!(signaler.signal(TerminalSignal::End));
            drop(reader);

            let completion = aggregator.wait().await;
            assert_eq!(completion.signal, SignalKind::End);
        });
    }

    #[test]
    fn test_closing_reader_reports_close_when_dropped_early() {
        futures::executor::block_on(async {
            let aggregator = CompletionAggregator::new();
            let reader = ClosingReader::new(Cursor::new(b"unread".to_vec()), aggregator.signaler());
            drop(reader);
            assert_eq!(aggregator.wait().await.signal, SignalKind::Close);
        });
    }
}
