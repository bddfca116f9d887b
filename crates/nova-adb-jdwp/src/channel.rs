use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::{JdwpError, Result};

type BoxedSource = Box<dyn AsyncRead + Send + Unpin>;

enum Source {
    /// The buffer *is* the content; rewinding is a cursor reset.
    Memory,
    /// Bytes pulled from `reader` are retained in the buffer until the final
    /// rewind has been replayed.
    Stream(BoxedSource),
}

/// A byte source that can be replayed from offset zero.
///
/// Wrapping a one-shot reader, every byte handed to a caller is also appended
/// to an internal buffer so [`rewind`](Self::rewind) can serve it again
/// without touching the underlying reader. Once [`final_rewind`](Self::final_rewind)
/// is called no further rewind is possible: the buffered prefix is replayed one
/// last time, then released, and the rest of the stream passes straight through.
///
/// A channel is owned by a single packet/request. Concurrent readers of the same
/// instance must be serialized by the owner.
pub struct RewindableChannel {
    source: Source,
    buffer: Vec<u8>,
    position: usize,
    finalized: bool,
    ever_read: bool,
}

impl RewindableChannel {
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: Source::Memory,
            buffer: bytes.into(),
            position: 0,
            finalized: false,
            ever_read: false,
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            source: Source::Stream(Box::new(reader)),
            buffer: Vec::new(),
            position: 0,
            finalized: false,
            ever_read: false,
        }
    }

    /// Reads up to `buf.len()` bytes; `Ok(0)` means end of stream.
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.read(buf).await?)
    }

    /// Moves the cursor back to the first byte ever read.
    pub fn rewind(&mut self) -> Result<()> {
        if self.finalized {
            return Err(JdwpError::InvalidState(
                "rewind() called after final_rewind()".to_string(),
            ));
        }
        self.position = 0;
        Ok(())
    }

    /// Rewinds one last time and stops retaining bytes.
    ///
    /// Calling this before anything was read is allowed: nothing is buffered
    /// and every read is a direct pass-through.
    pub fn final_rewind(&mut self) -> Result<()> {
        if self.finalized {
            return Err(JdwpError::InvalidState(
                "final_rewind() may only be called once".to_string(),
            ));
        }
        self.finalized = true;
        self.position = 0;
        self.release_if_drained();
        tracing::trace!(
            target: "nova.adb.jdwp",
            buffered = self.buffer.len(),
            "channel finalized"
        );
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn has_been_read(&self) -> bool {
        self.ever_read
    }

    /// Number of bytes currently retained for replay.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn release_if_drained(&mut self) {
        if self.finalized
            && matches!(self.source, Source::Stream(_))
            && self.position >= self.buffer.len()
        {
            self.buffer = Vec::new();
            self.position = 0;
        }
    }
}

impl AsyncRead for RewindableChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.ever_read = true;

        if this.position < this.buffer.len() {
            let n = buf.remaining().min(this.buffer.len() - this.position);
            buf.put_slice(&this.buffer[this.position..this.position + n]);
            this.position += n;
            this.release_if_drained();
            return Poll::Ready(Ok(()));
        }

        match &mut this.source {
            Source::Memory => Poll::Ready(Ok(())),
            Source::Stream(reader) => {
                let before = buf.filled().len();
                ready!(Pin::new(reader.as_mut()).poll_read(cx, buf))?;
                if !this.finalized {
                    this.buffer.extend_from_slice(&buf.filled()[before..]);
                    this.position = this.buffer.len();
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}

impl fmt::Debug for RewindableChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Memory => "memory",
            Source::Stream(_) => "stream",
        };
        f.debug_struct("RewindableChannel")
            .field("source", &source)
            .field("buffered", &self.buffer.len())
            .field("position", &self.position)
            .field("finalized", &self.finalized)
            .field("ever_read", &self.ever_read)
            .finish()
    }
}
