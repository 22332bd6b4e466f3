//! Fatal, connection-killing errors, kept distinct from per-call [`StatusCode`]s.
//!
//! A bad `ServiceResult` on one request never tears down the channel; the
//! variants here always do.

use crate::status_code::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("security error: {0}")]
    Security(String),
    #[error("connection closed")]
    Closed,
    #[error("{0}")]
    Status(StatusCode),
}

impl Error {
    /// Best-effort mapping to the `StatusCode` a caller-facing API should see.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Io(_) => StatusCode::BadCommunicationError,
            Error::Protocol(_) => StatusCode::BadDecodingError,
            Error::Security(_) => StatusCode::BadSecurityChecksFailed,
            Error::Closed => StatusCode::BadConnectionClosed,
            Error::Status(s) => *s,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
