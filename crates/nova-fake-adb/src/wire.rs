//! ADB smart-socket framing.
//!
//! Requests are `<4 hex digits><request>`; replies start with `OKAY` or
//! `FAIL<4 hex digits><message>`. Text bodies use the same 4-hex length prefix.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ServiceError};

pub const OKAY: &[u8; 4] = b"OKAY";
pub const FAIL: &[u8; 4] = b"FAIL";

/// Largest body a 4-hex-digit length prefix can describe.
pub const MAX_PAYLOAD: usize = 0xFFFF;

/// A bidirectional byte stream a service can be served on.
pub trait AdbStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AdbStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub fn encode_request(request: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4 + request.len());
    out.extend_from_slice(length_prefix(request.len())?.as_bytes());
    out.extend_from_slice(request.as_bytes());
    Ok(out)
}

fn length_prefix(len: usize) -> Result<String> {
    if len > MAX_PAYLOAD {
        return Err(ServiceError::rejected(format!(
            "body of {len} bytes does not fit a 4-digit length prefix"
        )));
    }
    Ok(format!("{len:04x}"))
}

async fn read_hex_len<R>(reader: &mut R) -> Result<Option<usize>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let text = std::str::from_utf8(&len)
        .map_err(|_| ServiceError::malformed("length prefix is not ASCII"))?;
    let len = usize::from_str_radix(text, 16)
        .map_err(|_| ServiceError::malformed(format!("invalid length prefix '{text}'")))?;
    Ok(Some(len))
}

/// Reads one request frame. `Ok(None)` means the peer closed the connection
/// between requests.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let Some(len) = read_hex_len(reader).await? else {
        return Ok(None);
    };
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let request = String::from_utf8(body)
        .map_err(|_| ServiceError::malformed("request is not valid UTF-8"))?;
    Ok(Some(request))
}

pub async fn write_okay<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(OKAY).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_fail<W>(writer: &mut W, message: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    // Overlong messages are cut rather than turned into a second error.
    let mut end = message.len().min(MAX_PAYLOAD);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    let message = &message[..end];

    let mut frame = Vec::with_capacity(8 + message.len());
    frame.extend_from_slice(FAIL);
    frame.extend_from_slice(format!("{:04x}", message.len()).as_bytes());
    frame.extend_from_slice(message.as_bytes());
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_length_prefixed<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let prefix = length_prefix(body.len())?;
    writer.write_all(prefix.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Client side of a status reply: `Ok(Ok(()))` for `OKAY`, `Ok(Err(message))`
/// for `FAIL`.
pub async fn read_status<R>(reader: &mut R) -> Result<std::result::Result<(), String>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut status = [0u8; 4];
    reader.read_exact(&mut status).await?;
    match &status {
        OKAY => Ok(Ok(())),
        FAIL => {
            let body = read_length_prefixed(reader).await?;
            Ok(Err(String::from_utf8_lossy(&body).into_owned()))
        }
        other => Err(ServiceError::malformed(format!(
            "unexpected status {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

pub async fn read_length_prefixed<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = read_hex_len(reader)
        .await?
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
