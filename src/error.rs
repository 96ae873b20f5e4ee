use http::StatusCode;
use std::io;

/// Errors produced by the middlewares and their helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error that maps onto an HTTP status code.
    #[error("[{}] {body}", .status.as_u16())]
    Http {
        /// Status code sent (or to be sent) to the client.
        status: StatusCode,
        /// Human readable message.
        body: String,
    },
    /// The underlying response writer failed.
    #[error("writing response: {0}")]
    Io(#[from] io::Error),
    /// A JSON value could not be encoded.
    #[error("encoding json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a status-coded error.
    pub fn http(status: StatusCode, body: impl Into<String>) -> Self {
        Error::Http {
            status,
            body: body.into(),
        }
    }

    /// Returns the status code of a status-coded error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the message of a status-coded error.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Returns true if this is a status-coded error with exactly `status`.
    pub fn is(&self, status: StatusCode) -> bool {
        self.status_code() == Some(status)
    }

    /// 400 Bad Request.
    pub fn is_bad_request(&self) -> bool {
        self.is(StatusCode::BAD_REQUEST)
    }

    /// 401 Unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        self.is(StatusCode::UNAUTHORIZED)
    }

    /// 403 Forbidden.
    pub fn is_forbidden(&self) -> bool {
        self.is(StatusCode::FORBIDDEN)
    }

    /// 404 Not Found.
    pub fn is_not_found(&self) -> bool {
        self.is(StatusCode::NOT_FOUND)
    }

    /// Any 5xx status.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(|s| s.is_server_error())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
