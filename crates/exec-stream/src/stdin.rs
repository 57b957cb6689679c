//! Stdin handling for execs
//!
//! This module provides the `StdinHandle` type for writing to an exec's stdin.
//! It supports direct writes as well as feeding a whole [`StdinSource`].

use crate::request::StdinSource;
use crate::runtime::BoxWriter;
use futures::io::AsyncWriteExt;
use std::io;

/// Handle for writing to an exec's stdin
pub struct StdinHandle {
    input: Option<BoxWriter>,
}

impl StdinHandle {
    /// Create a new stdin handle
    pub fn new(input: BoxWriter) -> Self {
        Self { input: Some(input) }
    }

    /// Write raw bytes to stdin
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let input = self.writer()?;
        input.write_all(data).await?;
        input.flush().await
    }

    /// Write a line to stdin (adds newline)
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let input = self.writer()?;
        input.write_all(line.as_bytes()).await?;
        input.write_all(b"\n").await?;
        input.flush().await
    }

    /// Write a whole source, then close stdin.
    ///
    /// Returns the number of bytes written.
    pub async fn feed(&mut self, source: StdinSource) -> io::Result<u64> {
        let input = self.writer()?;
        let written = match source {
            StdinSource::Bytes(bytes) => {
                input.write_all(&bytes).await?;
                bytes.len() as u64
            }
            StdinSource::Reader(reader) => futures::io::copy(reader, input).await?,
            StdinSource::Channel(channel) => {
                let mut written = 0u64;
                while let Ok(chunk) = channel.recv().await {
                    input.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                written
            }
        };
        self.close().await?;
        Ok(written)
    }

    /// Close stdin, signalling end of input to the process
    pub async fn close(&mut self) -> io::Result<()> {
        match self.input.take() {
            Some(mut input) => input.close().await,
            None => Ok(()),
        }
    }

    /// Returns true once stdin has been closed
    pub fn is_closed(&self) -> bool {
        self.input.is_none()
    }

    fn writer(&mut self) -> io::Result<&mut BoxWriter> {
        self.input
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed"))
    }
}
