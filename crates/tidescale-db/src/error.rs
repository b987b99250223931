//! database error types.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// errors that can occur in database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// duplicate key/unique constraint violation.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// generic database error.
    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    /// whether the error is a unique constraint violation, e.g. two nodes
    /// racing for the same address.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return Error::AlreadyExists(msg);
        }
        match &err {
            DbErr::RecordNotFound(msg) => Error::NotFound(msg.clone()),
            DbErr::Conn(e) => Error::Connection(e.to_string()),
            DbErr::ConnectionAcquire(e) => Error::Connection(e.to_string()),
            _ => Error::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}
