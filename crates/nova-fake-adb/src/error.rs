use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Outcome of a failed device or host service.
///
/// `Malformed` and `Rejected` are reported to the peer as a `FAIL` frame; `Io`
/// means the connection itself is unusable and is dropped without a reply.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServiceError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ServiceError::Malformed(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ServiceError::Rejected(message.into())
    }

    /// Message to send in a `FAIL` frame, or `None` for transport errors.
    pub fn fail_message(&self) -> Option<String> {
        match self {
            ServiceError::Malformed(message) | ServiceError::Rejected(message) => {
                Some(message.clone())
            }
            ServiceError::Io(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
