//! api error handling for http handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::Error;

/// api error type for handler responses
#[derive(Debug)]
pub enum ApiError {
    /// bad request (400)
    BadRequest(String),
    /// unauthorized error (401)
    Unauthorized(String),
    /// forbidden (403)
    Forbidden(String),
    /// not found error (404)
    NotFound(String),
    /// the client must upgrade (426)
    UpgradeRequired(String),
    /// internal server error (500)
    Internal(String),
}

impl ApiError {
    /// create internal server error from any error type
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    /// create unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// create not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let msg = err.to_string();
        match err {
            Error::Validation(_)
            | Error::InvalidAuthKey
            | Error::TagOwnership(_)
            | Error::Expression(_) => Self::BadRequest(msg),
            Error::NotFound { .. } => Self::NotFound(msg),
            Error::Forbidden(_) => Self::Forbidden(msg),
            Error::UnsupportedVersion(_) => Self::UpgradeRequired(msg),
            Error::Storage(_) | Error::Allocation(_) | Error::Fanout(_) | Error::Internal(_) => {
                Self::Internal(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::UpgradeRequired(msg) => (StatusCode::UPGRADE_REQUIRED, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, message).into_response()
    }
}

/// extension trait for converting results to apierror
pub trait ResultExt<T> {
    /// convert error to internal server error
    fn map_internal(self) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn map_internal(self) -> Result<T, ApiError> {
        self.map_err(ApiError::internal)
    }
}

/// extension trait for converting options to apierror
pub trait OptionExt<T> {
    /// convert none to unauthorized error
    fn or_unauthorized(self, msg: &str) -> Result<T, ApiError>;
    /// convert none to not found error
    fn or_not_found(self, msg: &str) -> Result<T, ApiError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_unauthorized(self, msg: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::unauthorized(msg))
    }

    fn or_not_found(self, msg: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(msg))
    }
}
