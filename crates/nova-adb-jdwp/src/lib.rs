//! JDWP packets as they travel over an ADB `jdwp:<pid>` channel.
//!
//! This crate only deals with the packet level: the fixed 11-byte header, the
//! payload bytes that follow it, and human-readable names for diagnostics. It
//! does not interpret command payloads.
//!
//! Payloads are exposed through [`RewindableChannel`], which lets a packet be
//! written (or cloned) several times even when its payload is still streaming
//! in from a one-shot transport.

mod channel;
mod codec;
pub mod commands;
mod packet;

use std::io;

use thiserror::Error;

pub use channel::RewindableChannel;
pub use codec::{encode_command, encode_reply, JdwpHeader, JdwpReader, JdwpWriter};
pub use packet::JdwpPacket;

/// Size of the fixed JDWP packet header (`length`, `id`, `flags`, 2 trailing bytes).
pub const JDWP_HEADER_LEN: usize = 11;

/// Bit set in `flags` for reply packets.
pub const REPLY_FLAG: u8 = 0x80;

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JdwpError {
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, JdwpError::InvalidArgument(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, JdwpError::InvalidState(_))
    }
}

pub type Result<T, E = JdwpError> = std::result::Result<T, E>;
