use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::JdwpHeader;
use crate::commands::{cmd_set_to_string, cmd_to_string, error_code_to_string};
use crate::{JdwpError, Result, RewindableChannel, JDWP_HEADER_LEN, REPLY_FLAG};

/// Payload bytes are streamed through a buffer of at most this size.
const COPY_CHUNK: usize = 8 * 1024;

/// A JDWP packet: an 11-byte header plus `length - 11` payload bytes read
/// through a [`RewindableChannel`].
///
/// Setters take wide signed integers so out-of-range values (negative command
/// sets, lengths below the header size, ...) are reported as
/// [`JdwpError::InvalidArgument`] instead of being silently truncated. A failed
/// setter leaves the packet unchanged.
pub struct JdwpPacket {
    header: JdwpHeader,
    payload: RewindableChannel,
}

impl Default for JdwpPacket {
    fn default() -> Self {
        Self {
            header: JdwpHeader::default(),
            payload: RewindableChannel::empty(),
        }
    }
}

impl JdwpPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(id: i32, cmd_set: u8, cmd: u8, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            header: JdwpHeader {
                length: (JDWP_HEADER_LEN + payload.len()) as u32,
                id,
                flags: 0,
                cmd_set,
                cmd,
                error_code: 0,
            },
            payload: RewindableChannel::from_bytes(payload),
        }
    }

    pub fn reply(id: i32, error_code: u16, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            header: JdwpHeader {
                length: (JDWP_HEADER_LEN + payload.len()) as u32,
                id,
                flags: REPLY_FLAG,
                cmd_set: 0,
                cmd: 0,
                error_code,
            },
            payload: RewindableChannel::from_bytes(payload),
        }
    }

    /// Pairs an already-decoded header with a payload channel.
    pub fn from_parts(header: JdwpHeader, payload: RewindableChannel) -> Self {
        Self { header, payload }
    }

    /// Decodes a complete packet held in memory. Bytes past `length` are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = JdwpHeader::decode(bytes)?;
        let end = header.length as usize;
        if bytes.len() < end {
            return Err(JdwpError::InvalidArgument(format!(
                "packet declares {end} bytes but only {} are available",
                bytes.len()
            )));
        }
        Ok(Self {
            header,
            payload: RewindableChannel::from_bytes(&bytes[JDWP_HEADER_LEN..end]),
        })
    }

    /// Reads one packet, payload included, into memory.
    ///
    /// Returns `Ok(None)` when the stream ends before a header could be read.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let Some(header) = read_header(reader).await? else {
            return Ok(None);
        };

        // The buffer grows with the bytes that arrive, not with the length the
        // header claims.
        let len = header.payload_len();
        let mut payload = Vec::with_capacity(len.min(COPY_CHUNK));
        (&mut *reader)
            .take(len as u64)
            .read_to_end(&mut payload)
            .await?;
        if payload.len() < len {
            return Err(short_payload(len, payload.len()));
        }

        Ok(Some(Self {
            header,
            payload: RewindableChannel::from_bytes(payload),
        }))
    }

    /// Reads the header from `reader` and keeps the payload on the wire: it is
    /// pulled (and retained for rewinding) only as the packet is consumed.
    pub async fn read_streaming<R>(mut reader: R) -> Result<Option<Self>>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let Some(header) = read_header(&mut reader).await? else {
            return Ok(None);
        };
        let payload = reader.take(header.payload_len() as u64);
        Ok(Some(Self {
            header,
            payload: RewindableChannel::from_reader(payload),
        }))
    }

    pub fn header(&self) -> &JdwpHeader {
        &self.header
    }

    pub fn length(&self) -> u32 {
        self.header.length
    }

    pub fn id(&self) -> i32 {
        self.header.id
    }

    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    pub fn is_reply(&self) -> bool {
        self.header.is_reply()
    }

    pub fn is_command(&self) -> bool {
        !self.header.is_reply()
    }

    pub fn payload_len(&self) -> usize {
        self.header.payload_len()
    }

    pub fn payload_mut(&mut self) -> &mut RewindableChannel {
        &mut self.payload
    }

    pub fn cmd_set(&self) -> Result<u8> {
        self.require_command("cmd_set")?;
        Ok(self.header.cmd_set)
    }

    pub fn cmd(&self) -> Result<u8> {
        self.require_command("cmd")?;
        Ok(self.header.cmd)
    }

    pub fn error_code(&self) -> Result<u16> {
        self.require_reply("error_code")?;
        Ok(self.header.error_code)
    }

    pub fn set_length(&mut self, length: i64) -> Result<()> {
        let length = checked_range(
            "length",
            length,
            JDWP_HEADER_LEN as i64,
            i64::from(u32::MAX),
        )?;
        self.header.length = length as u32;
        Ok(())
    }

    pub fn set_id(&mut self, id: i32) {
        self.header.id = id;
    }

    /// Replaces the raw flags byte. Flipping the reply bit clears the
    /// command/reply fields, as [`set_is_reply`](Self::set_is_reply) does.
    pub fn set_flags(&mut self, flags: i32) -> Result<()> {
        let flags = checked_range("flags", i64::from(flags), 0, i64::from(u8::MAX))? as u8;
        let was_reply = self.header.is_reply();
        self.header.flags = flags;
        if self.header.is_reply() != was_reply {
            self.clear_union();
        }
        Ok(())
    }

    pub fn set_cmd_set(&mut self, cmd_set: i32) -> Result<()> {
        let cmd_set = checked_range("cmd_set", i64::from(cmd_set), 0, i64::from(u8::MAX))?;
        self.require_command("cmd_set")?;
        self.header.cmd_set = cmd_set as u8;
        Ok(())
    }

    pub fn set_cmd(&mut self, cmd: i32) -> Result<()> {
        let cmd = checked_range("cmd", i64::from(cmd), 0, i64::from(u8::MAX))?;
        self.require_command("cmd")?;
        self.header.cmd = cmd as u8;
        Ok(())
    }

    pub fn set_error_code(&mut self, error_code: i32) -> Result<()> {
        let error_code = checked_range(
            "error_code",
            i64::from(error_code),
            0,
            i64::from(u16::MAX),
        )?;
        self.require_reply("error_code")?;
        self.header.error_code = error_code as u16;
        Ok(())
    }

    /// Turns the packet into a command (`true`) or a reply (`false`).
    ///
    /// `flags` becomes `0` or [`REPLY_FLAG`], `id` goes back to its default
    /// of `0` and the command/reply fields are zeroed. `length` and the
    /// payload are kept.
    pub fn set_is_command(&mut self, is_command: bool) {
        self.header.flags = if is_command { 0 } else { REPLY_FLAG };
        self.header.id = 0;
        self.clear_union();
    }

    pub fn set_is_reply(&mut self, is_reply: bool) {
        self.set_is_command(!is_reply);
    }

    /// Writes the header followed by exactly `length - 11` payload bytes.
    ///
    /// The payload is rewound first, so the packet can be written any number
    /// of times until its channel is finalized.
    pub async fn write_to<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if !self.payload.is_finalized() {
            self.payload.rewind()?;
        }
        self.write_header_and_payload(out).await
    }

    /// Like [`write_to`](Self::write_to), but finalizes the payload channel so
    /// a streamed payload passes straight through without being retained.
    pub async fn write_final_to<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.payload.final_rewind()?;
        self.write_header_and_payload(out).await
    }

    /// Copies this packet into an independent, memory-backed packet.
    ///
    /// `scratch` is reused for the payload copy; the original's channel is
    /// rewound afterwards so both packets replay from offset zero. Fails with
    /// [`JdwpError::InvalidState`] once the original's channel is finalized.
    pub async fn deep_clone(&mut self, scratch: &mut Vec<u8>) -> Result<JdwpPacket> {
        let len = self.header.payload_len();
        self.payload.rewind()?;

        scratch.clear();
        scratch.try_reserve(len).map_err(|_| {
            JdwpError::InvalidArgument(format!("cannot allocate {len}-byte payload"))
        })?;
        (&mut self.payload)
            .take(len as u64)
            .read_to_end(scratch)
            .await?;
        self.payload.rewind()?;

        if scratch.len() < len {
            return Err(short_payload(len, scratch.len()));
        }

        Ok(JdwpPacket {
            header: self.header,
            payload: RewindableChannel::from_bytes(scratch.as_slice()),
        })
    }

    async fn write_header_and_payload<W>(&mut self, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let total = self.header.payload_len();
        out.write_all(&self.header.encode()).await?;

        let mut chunk = vec![0u8; total.min(COPY_CHUNK)];
        let mut remaining = total;
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            let n = self.payload.read_into(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(short_payload(total, total - remaining));
            }
            out.write_all(&chunk[..n]).await?;
            remaining -= n;
        }
        out.flush().await?;

        tracing::trace!(
            target: "nova.adb.jdwp",
            id = self.header.id,
            length = self.header.length,
            "wrote packet"
        );
        Ok(())
    }

    fn require_command(&self, field: &str) -> Result<()> {
        if self.header.is_reply() {
            return Err(JdwpError::InvalidState(format!(
                "`{field}` is only defined for command packets"
            )));
        }
        Ok(())
    }

    fn require_reply(&self, field: &str) -> Result<()> {
        if !self.header.is_reply() {
            return Err(JdwpError::InvalidState(format!(
                "`{field}` is only defined for reply packets"
            )));
        }
        Ok(())
    }

    fn clear_union(&mut self) {
        self.header.cmd_set = 0;
        self.header.cmd = 0;
        self.header.error_code = 0;
    }
}

async fn read_header<R>(reader: &mut R) -> Result<Option<JdwpHeader>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut bytes = [0u8; JDWP_HEADER_LEN];
    match reader.read_exact(&mut bytes).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    JdwpHeader::decode(&bytes).map(Some)
}

fn checked_range(field: &str, value: i64, min: i64, max: i64) -> Result<i64> {
    if value < min || value > max {
        return Err(JdwpError::InvalidArgument(format!(
            "{field} must be in {min}..={max}, got {value}"
        )));
    }
    Ok(value)
}

fn short_payload(expected: usize, got: usize) -> JdwpError {
    JdwpError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("payload ended after {got} of {expected} bytes"),
    ))
}

impl fmt::Display for JdwpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        write!(
            f,
            "JdwpPacket(length={}, id={}, flags={:#04X}, ",
            h.length, h.id, h.flags
        )?;
        if h.is_reply() {
            write!(
                f,
                "isReply=true, errorCode={}[{}])",
                error_code_to_string(h.error_code),
                h.error_code
            )
        } else {
            write!(
                f,
                "isCommand=true, cmdSet={}[{}], cmd={}[{}])",
                cmd_set_to_string(h.cmd_set),
                h.cmd_set,
                cmd_to_string(h.cmd_set, h.cmd),
                h.cmd
            )
        }
    }
}

impl fmt::Debug for JdwpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdwpPacket")
            .field("header", &self.header)
            .field("payload", &self.payload)
            .finish()
    }
}
