//! Exact-length reads over a byte stream.
//!
//! The stream has no message boundaries and bytes may arrive in arbitrary
//! pieces. `FramedReader` keeps an internal buffer and only hands out a
//! requested byte count once all of it has arrived. Waiting for more bytes
//! suspends on the socket read, so other tasks on the runtime keep running.

use crate::error::ServerError;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes requested from the transport per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Buffered reader that yields exact byte counts.
#[derive(Debug)]
pub struct FramedReader<R> {
    inner: R,
    buffer: BytesMut,
    read_timeout: Option<Duration>,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            read_timeout: None,
            bytes_read: 0,
        }
    }

    /// Bounds how long a single read may wait for data.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Returns the number of bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the total number of bytes received from the transport.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Waits until at least `len` bytes are buffered, without consuming them.
    ///
    /// Returns `Ok(false)` if the stream closes first.
    pub async fn wait_for(&mut self, len: usize) -> Result<bool, ServerError> {
        while self.buffer.len() < len {
            if self.read_more().await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fills `dst` completely.
    ///
    /// A close before `dst.len()` bytes have arrived is a
    /// [`ServerError::ShortRead`]; the partial bytes are left in the buffer.
    pub async fn read_exactly(&mut self, dst: &mut [u8]) -> Result<(), ServerError> {
        if !self.wait_for(dst.len()).await? {
            return Err(ServerError::ShortRead {
                expected: dst.len(),
                received: self.buffer.len(),
            });
        }
        dst.copy_from_slice(&self.buffer[..dst.len()]);
        self.buffer.advance(dst.len());
        Ok(())
    }

    async fn read_more(&mut self) -> Result<usize, ServerError> {
        self.buffer.reserve(READ_CHUNK_SIZE);
        let read = self.inner.read_buf(&mut self.buffer);
        let n = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read)
                .await
                .map_err(|_| ServerError::Timeout(timeout))??,
            None => read.await?,
        };
        self.bytes_read += n as u64;
        Ok(n)
    }
}
