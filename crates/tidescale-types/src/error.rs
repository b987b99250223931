//! error types for domain-level validation.

use thiserror::Error;

use crate::{AuthKeyTokenError, KeyParseError, TagError};

/// errors raised while constructing or validating domain values.
#[derive(Debug, Error)]
pub enum Error {
    /// a tag failed validation.
    #[error("invalid tag: {0}")]
    InvalidTag(#[from] TagError),

    /// an auth key token was malformed.
    #[error("invalid auth key: {0}")]
    InvalidAuthKey(#[from] AuthKeyTokenError),

    /// a wire key could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyParseError),

    /// a configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
