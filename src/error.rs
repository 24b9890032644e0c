//! Error types for the driver.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the driver.
///
/// Transport and protocol errors are fatal to the connection that observed
/// them; every later operation on that connection fails with
/// [`Error::DeadConnection`]. Backend errors are fatal only when the server
/// reports severity `FATAL`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// I/O failure on the transport.
    #[error("i/o error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Framing error, unexpected message, or malformed frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Structured error reported by the server.
    #[error("{severity}: {message} (SQLSTATE {code})")]
    Backend {
        severity: String,
        code: String,
        message: String,
    },

    /// Authentication failed or the server requested an unsupported method.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server refused the TLS upgrade or the handshake failed.
    #[error("tls negotiation failed: {0}")]
    Tls(String),

    /// Invalid connection URL or option.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A parameter value has no encoding for the statement's declared type.
    #[error("cannot serialize parameter: {0}")]
    Serialization(String),

    /// Caller misuse: wrong parameter count, wrong scan destination count,
    /// operation on a closed cursor.
    #[error("{0}")]
    Usage(String),

    /// A single-row query produced a different number of rows.
    #[error("expected exactly 1 row, found {rows}")]
    NotSingleRow { rows: u64 },

    /// [`Connection::wait_for_notification`] timed out. Benign: the
    /// connection remains usable.
    ///
    /// [`Connection::wait_for_notification`]: crate::Connection::wait_for_notification
    #[error("timed out waiting for notification")]
    NotificationTimeout,

    /// The connection was killed by an earlier transport or protocol error.
    #[error("connection is dead")]
    DeadConnection,

    /// The connection was closed by the client; recorded as the cause of
    /// death after [`Connection::close`](crate::Connection::close).
    #[error("connection closed")]
    Closed,
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Whether this is a backend error with severity `FATAL`.
    pub fn is_fatal_backend(&self) -> bool {
        matches!(self, Error::Backend { severity, .. } if severity == "FATAL")
    }

    /// The SQLSTATE code, for backend errors.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Backend { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display() {
        let err = Error::Backend {
            severity: "ERROR".to_string(),
            code: "42P01".to_string(),
            message: "relation \"foo\" does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR: relation \"foo\" does not exist (SQLSTATE 42P01)"
        );
        assert_eq!(err.sqlstate(), Some("42P01"));
        assert!(!err.is_fatal_backend());
    }

    #[test]
    fn fatal_severity_detection() {
        let err = Error::Backend {
            severity: "FATAL".to_string(),
            code: "57P01".to_string(),
            message: "terminating connection".to_string(),
        };
        assert!(err.is_fatal_backend());
    }

    #[test]
    fn io_errors_are_cloneable() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "closed").into();
        let copy = err.clone();
        assert!(matches!(copy, Error::Io(_)));
    }
}
