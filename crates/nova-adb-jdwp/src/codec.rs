use crate::{JdwpError, Result, JDWP_HEADER_LEN, REPLY_FLAG};

/// The fixed 11-byte JDWP header, big-endian on the wire:
///
/// ```text
/// length:u32 | id:i32 | flags:u8 | cmd_set:u8 cmd:u8    (command)
///                                | error_code:u16       (reply)
/// ```
///
/// Only the pair matching [`is_reply`](Self::is_reply) is meaningful; the other
/// one is kept at zero by [`decode`](Self::decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JdwpHeader {
    pub length: u32,
    pub id: i32,
    pub flags: u8,
    pub cmd_set: u8,
    pub cmd: u8,
    pub error_code: u16,
}

impl Default for JdwpHeader {
    fn default() -> Self {
        Self {
            length: JDWP_HEADER_LEN as u32,
            id: 0,
            flags: 0,
            cmd_set: 0,
            cmd: 0,
            error_code: 0,
        }
    }
}

impl JdwpHeader {
    pub fn is_reply(&self) -> bool {
        self.flags & REPLY_FLAG != 0
    }

    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(JDWP_HEADER_LEN)
    }

    pub fn encode(&self) -> [u8; JDWP_HEADER_LEN] {
        let mut w = JdwpWriter::with_capacity(JDWP_HEADER_LEN);
        w.write_u32(self.length);
        w.write_i32(self.id);
        w.write_u8(self.flags);
        if self.is_reply() {
            w.write_u16(self.error_code);
        } else {
            w.write_u8(self.cmd_set);
            w.write_u8(self.cmd);
        }

        let mut out = [0u8; JDWP_HEADER_LEN];
        out.copy_from_slice(&w.into_vec());
        out
    }

    /// Decodes the first [`JDWP_HEADER_LEN`] bytes of `bytes`.
    ///
    /// Trailing bytes (the payload) are ignored. A `length` below the header
    /// size is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = JdwpReader::new(bytes);
        let length = r.read_u32()?;
        let id = r.read_i32()?;
        let flags = r.read_u8()?;

        let mut header = JdwpHeader {
            length,
            id,
            flags,
            ..JdwpHeader::default()
        };
        if header.is_reply() {
            header.error_code = r.read_u16()?;
        } else {
            header.cmd_set = r.read_u8()?;
            header.cmd = r.read_u8()?;
        }

        if (length as usize) < JDWP_HEADER_LEN {
            return Err(JdwpError::InvalidArgument(format!(
                "packet length {length} is smaller than the {JDWP_HEADER_LEN}-byte header"
            )));
        }
        Ok(header)
    }
}

pub struct JdwpWriter {
    buf: Vec<u8>,
}

impl Default for JdwpWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JdwpWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

pub struct JdwpReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JdwpReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn require(&self, n: usize) -> Result<()> {
        let underflow = || {
            JdwpError::InvalidArgument(format!(
                "buffer underflow: need {n} bytes at {}, have {}",
                self.pos,
                self.buf.len()
            ))
        };
        let end = self.pos.checked_add(n).ok_or_else(underflow)?;
        if end > self.buf.len() {
            return Err(underflow());
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.require(2)?;
        let v = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.require(4)?;
        let v = u32::from_be_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.require(len)?;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Encodes a complete command packet (header + payload) into one buffer.
pub fn encode_command(id: i32, cmd_set: u8, cmd: u8, payload: &[u8]) -> Vec<u8> {
    let header = JdwpHeader {
        length: (JDWP_HEADER_LEN + payload.len()) as u32,
        id,
        flags: 0,
        cmd_set,
        cmd,
        error_code: 0,
    };
    let mut w = JdwpWriter::with_capacity(header.length as usize);
    w.write_bytes(&header.encode());
    w.write_bytes(payload);
    w.into_vec()
}

/// Encodes a complete reply packet (header + payload) into one buffer.
pub fn encode_reply(id: i32, error_code: u16, payload: &[u8]) -> Vec<u8> {
    let header = JdwpHeader {
        length: (JDWP_HEADER_LEN + payload.len()) as u32,
        id,
        flags: REPLY_FLAG,
        cmd_set: 0,
        cmd: 0,
        error_code,
    };
    let mut w = JdwpWriter::with_capacity(header.length as usize);
    w.write_bytes(&header.encode());
    w.write_bytes(payload);
    w.into_vec()
}
