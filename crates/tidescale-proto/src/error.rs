//! protocol error types.

use thiserror::Error;

/// errors that can occur in protocol operations.
#[derive(Debug, Error)]
pub enum Error {
    /// malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// the client's capability version is too old.
    #[error("unsupported capability version: {0}")]
    UnsupportedVersion(u32),

    /// encoding or compression failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidMessage(err.to_string())
    }
}
