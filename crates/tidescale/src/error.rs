//! error types for the control server.

use std::fmt;

use thiserror::Error;
use tidescale_db::AllocationError;
use tidescale_policy::{ExprError, TagOwnerError};

use crate::broker::FanoutError;

/// errors raised while serving clients.
#[derive(Debug, Error)]
pub enum Error {
    /// the request is malformed or refers to something invalid.
    #[error("invalid request: {0}")]
    Validation(String),

    /// the auth key is unknown, expired, or its secret does not match.
    #[error("invalid auth key")]
    InvalidAuthKey,

    /// a node asked for tags its owner may not apply.
    #[error(transparent)]
    TagOwnership(#[from] TagOwnerError),

    /// an iam filter expression could not be evaluated.
    #[error("iam filter failed: {0}")]
    Expression(#[from] ExprError),

    /// a referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// entity kind, e.g. `"node"`.
        kind: &'static str,
        /// the id that was looked up.
        id: String,
    },

    /// the caller is not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// the client speaks a capability version older than the minimum.
    #[error("unsupported capability version {0}")]
    UnsupportedVersion(u32),

    /// the repository failed.
    #[error("storage error: {0}")]
    Storage(#[from] tidescale_db::Error),

    /// no address could be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// one or more notification sinks could not be reached.
    #[error(transparent)]
    Fanout(#[from] FanoutError),

    /// anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// wrap any displayable error as [`Error::Internal`].
    pub fn internal(e: impl fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<tidescale_proto::Error> for Error {
    fn from(err: tidescale_proto::Error) -> Self {
        match err {
            tidescale_proto::Error::UnsupportedVersion(v) => Error::UnsupportedVersion(v),
            tidescale_proto::Error::InvalidMessage(msg) => Error::Validation(msg),
            tidescale_proto::Error::Serialization(msg) => Error::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}

/// result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;
