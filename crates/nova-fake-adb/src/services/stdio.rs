use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::wire::AdbStream;

/// Shell protocol v2 packet ids.
pub(crate) const ID_STDIN: u8 = 0;
pub(crate) const ID_STDOUT: u8 = 1;
pub(crate) const ID_STDERR: u8 = 2;
pub(crate) const ID_EXIT: u8 = 3;
/// Same value as [`ID_EXIT`], sent by the client to signal end of stdin.
pub(crate) const ID_CLOSE_STDIN: u8 = 3;

const V2_HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// stdin/stdout are the bare socket; stderr is merged into stdout and
    /// there is no exit status.
    Raw,
    /// `id:u8 | len:u32 LE | data` packets in both directions.
    ShellV2,
}

/// Standard streams of one service invocation.
pub(crate) struct ServiceIo<'a> {
    stream: &'a mut dyn AdbStream,
    framing: Framing,
    /// Unread bytes left in the current v2 stdin packet.
    stdin_pending: usize,
    stdin_closed: bool,
}

impl<'a> ServiceIo<'a> {
    pub(crate) fn new(stream: &'a mut dyn AdbStream, framing: Framing) -> Self {
        Self {
            stream,
            framing,
            stdin_pending: 0,
            stdin_closed: false,
        }
    }

    pub(crate) async fn stdout(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_packet(ID_STDOUT, data).await
    }

    pub(crate) async fn stderr(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_packet(ID_STDERR, data).await
    }

    /// Reports the exit status. A no-op for raw streams.
    pub(crate) async fn exit(&mut self, code: u8) -> io::Result<()> {
        match self.framing {
            Framing::Raw => Ok(()),
            Framing::ShellV2 => self.write_packet(ID_EXIT, &[code]).await,
        }
    }

    async fn write_packet(&mut self, id: u8, data: &[u8]) -> io::Result<()> {
        if let Framing::ShellV2 = self.framing {
            let len = u32::try_from(data.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;
            let mut header = [0u8; V2_HEADER_LEN];
            header[0] = id;
            header[1..].copy_from_slice(&len.to_le_bytes());
            self.stream.write_all(&header).await?;
        }
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Reads stdin into `buf`; `Ok(0)` is end of input.
    pub(crate) async fn read_stdin(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.stdin_closed {
            return Ok(0);
        }
        match self.framing {
            Framing::Raw => self.stream.read(buf).await,
            Framing::ShellV2 => {
                while self.stdin_pending == 0 {
                    if !self.next_stdin_packet().await? {
                        self.stdin_closed = true;
                        return Ok(0);
                    }
                }
                let want = buf.len().min(self.stdin_pending);
                let n = self.stream.read(&mut buf[..want]).await?;
                if n == 0 {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                self.stdin_pending -= n;
                Ok(n)
            }
        }
    }

    /// Advances to the next stdin data packet, skipping packets of other
    /// kinds. Returns `false` once stdin is closed.
    async fn next_stdin_packet(&mut self) -> io::Result<bool> {
        loop {
            let mut header = [0u8; V2_HEADER_LEN];
            match self.stream.read_exact(&mut header).await {
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(err) => return Err(err),
            }
            let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;

            match header[0] {
                ID_STDIN => {
                    self.stdin_pending = len;
                    return Ok(true);
                }
                ID_CLOSE_STDIN => {
                    self.skip(len).await?;
                    return Ok(false);
                }
                _ => self.skip(len).await?,
            }
        }
    }

    async fn skip(&mut self, len: usize) -> io::Result<()> {
        let skipped = tokio::io::copy(
            &mut (&mut *self.stream).take(len as u64),
            &mut tokio::io::sink(),
        )
        .await?;
        if skipped < len as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Consumes stdin and returns how many bytes were read.
    ///
    /// With `Some(n)`, reads exactly `n` bytes and fails with
    /// `UnexpectedEof` if stdin ends first; with `None`, reads to the end.
    pub(crate) async fn drain_stdin(&mut self, limit: Option<u64>) -> io::Result<u64> {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        loop {
            let want = match limit {
                Some(limit) if total >= limit => break,
                Some(limit) => buf.len().min((limit - total) as usize),
                None => buf.len(),
            };
            let n = self.read_stdin(&mut buf[..want]).await?;
            if n == 0 {
                if limit.is_some() {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                break;
            }
            total += n as u64;
        }
        Ok(total)
    }

    /// Echoes stdin to stdout until stdin ends.
    pub(crate) async fn copy_stdin_to_stdout(&mut self) -> io::Result<u64> {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read_stdin(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            self.stdout(&buf[..n]).await?;
            total += n as u64;
        }
    }
}

#[cfg(test)]
pub(crate) fn v2_packet(id: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![id];
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}
