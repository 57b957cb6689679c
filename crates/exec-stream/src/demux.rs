//! Demultiplexing of attached exec streams
//!
//! The runtime multiplexes stdout and stderr onto one connection. Every frame
//! starts with an eight byte header: the stream kind, three zero bytes and the
//! payload length as a big-endian `u32`.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::io;
use tracing::trace;

/// Size of a frame header in bytes
pub const HEADER_LEN: usize = 8;

/// Stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Echoed stdin, routed like stdout
    Stdin,
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
    /// Error message emitted by the runtime itself
    System,
}

impl StreamKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            3 => Some(StreamKind::System),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
            StreamKind::System => 3,
        }
    }
}

/// Encode a payload as a single frame
pub fn encode_frame(kind: StreamKind, payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let payload = &payload[..len as usize];

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(kind.as_byte());
    frame.extend_from_slice(&[0, 0, 0]);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Read a frame header, returning `None` on a clean end of stream
async fn read_header<R>(reader: &mut R) -> io::Result<Option<[u8; HEADER_LEN]>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended inside a frame header ({filled} of {HEADER_LEN} bytes)"),
            ));
        }
        filled += n;
    }
    Ok(Some(header))
}

/// Copy exactly `len` payload bytes into a sink, buffering as they arrive
async fn copy_payload<R, W>(reader: &mut R, len: u64, sink: &mut W) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = futures::io::copy((&mut *reader).take(len), sink).await?;
    if copied < len {
        return Err(truncated_payload(copied, len));
    }
    Ok(())
}

fn truncated_payload(read: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("stream ended inside a frame payload ({read} of {len} bytes)"),
    )
}

/// Split a multiplexed stream into stdout and stderr sinks.
///
/// Payloads for a stream without a sink are read and discarded. Returns the
/// number of payload bytes delivered to sinks once the stream ends cleanly.
pub async fn demux<R, O, E>(
    reader: &mut R,
    mut stdout: Option<&mut O>,
    mut stderr: Option<&mut E>,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut delivered = 0u64;

    while let Some(header) = read_header(reader).await? {
        let kind = StreamKind::from_byte(header[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown stream kind {} in frame header", header[0]),
            )
        })?;
        let len = u64::from(u32::from_be_bytes([header[4], header[5], header[6], header[7]]));
        trace!(?kind, len, "demuxing frame");

        match kind {
            StreamKind::Stdin | StreamKind::Stdout => match stdout.as_deref_mut() {
                Some(sink) => {
                    copy_payload(reader, len, sink).await?;
                    delivered += len;
                }
                None => copy_payload(reader, len, &mut futures::io::sink()).await?,
            },
            StreamKind::Stderr => match stderr.as_deref_mut() {
                Some(sink) => {
                    copy_payload(reader, len, sink).await?;
                    delivered += len;
                }
                None => copy_payload(reader, len, &mut futures::io::sink()).await?,
            },
            StreamKind::System => {
                let mut message = Vec::new();
                let read = (&mut *reader).take(len).read_to_end(&mut message).await?;
                if (read as u64) < len {
                    return Err(truncated_payload(read as u64, len));
                }
                return Err(io::Error::other(
                    String::from_utf8_lossy(&message).trim_end().to_string(),
                ));
            }
        }
    }

    if let Some(sink) = stdout {
        sink.flush().await?;
    }
    if let Some(sink) = stderr {
        sink.flush().await?;
    }
    Ok(delivered)
}
