//! Length-Delimited Framing
//!
//! Requests and answers travel as frames: a 4-byte big-endian length
//! followed by that many payload bytes.
//!
//! ```text
//! ┌────────────────┬──────────────────────────┐
//! │ length (u32 BE)│ payload (length bytes)   │
//! └────────────────┴──────────────────────────┘
//! ```
//!
//! [`FrameReader`] accumulates socket reads in a `BytesMut` buffer, the same
//! way the connection handler always has: TCP is a stream, so a single read
//! may carry half a frame or several frames at once.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default maximum payload size of a frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256;

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 1024;

/// Transport-level failures. All of them end the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The announced payload exceeds the configured maximum
    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// The peer closed the stream in the middle of a frame
    #[error("connection closed mid-frame")]
    Truncated,
}

/// Reads length-delimited frames from an async byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_frame_size,
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// frames.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(frame) = self.try_parse_frame()? {
                return Ok(Some(frame));
            }

            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::Truncated);
            }
        }
    }

    fn try_parse_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_LEN]);
        let size = u32::from_be_bytes(header) as usize;

        if size > self.max_frame_size {
            return Err(FrameError::TooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        let total = FRAME_HEADER_LEN + size;
        if self.buffer.len() < total {
            self.buffer.reserve(total - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        Ok(Some(self.buffer.split_to(size).freeze()))
    }
}

/// Prepends the length prefix to `payload`.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Writes one frame and flushes the writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await
}
