//! # Error Taxonomy
//!
//! Every error that can cross from host code into JS is one of the variants
//! below, never a bare `anyhow::Error` — JS-side code inspects `.code`,
//! `.errno`, `.path`, `.syscall` and `.verify_result` fields, so the shape of
//! these types is part of the host/guest contract, not an implementation
//! detail.

use std::io;
use thiserror::Error;

/// A transport-layer failure surfaced from the reactor (socket, pipe, timer).
///
/// Mirrors the reactor error codes of the original design: `code` is always
/// `"UV_ERROR"`-shaped, `errno` carries the negative OS error number when one
/// is available, and `message` is the human-readable string.
#[derive(Debug, Error, Clone)]
#[error("{message} (errno {errno})")]
pub struct TransportError {
    /// Always `"UV_ERROR"`, matching the JS-visible `error.code`.
    pub code: &'static str,
    /// Negative OS error number, or `0` when the underlying source had none.
    pub errno: i32,
    /// Human-readable message.
    pub message: String,
}

impl TransportError {
    /// Builds a `TransportError` from a std `io::Error`, preserving the raw
    /// OS error code when the platform provided one.
    pub fn from_io(err: &io::Error) -> Self {
        Self {
            code: "UV_ERROR",
            errno: err.raw_os_error().map(|e| -e).unwrap_or(0),
            message: err.to_string(),
        }
    }

    /// True when this error represents a cancelled operation.
    ///
    /// `std::io::ErrorKind` already normalizes platform-specific cancellation
    /// codes, so — unlike the original design — there is no separate
    /// raw-errno special case to reproduce here.
    pub fn is_cancelled(kind: io::ErrorKind) -> bool {
        matches!(kind, io::ErrorKind::Interrupted | io::ErrorKind::TimedOut)
    }
}

/// A filesystem operation failure: a `TransportError` plus the path and
/// syscall name the async request carried.
#[derive(Debug, Error, Clone)]
#[error("{transport} (path={path:?}, syscall={syscall})")]
pub struct FileError {
    /// The underlying transport error.
    #[source]
    pub transport: TransportError,
    /// The path the operation was acting on, when known.
    pub path: Option<String>,
    /// The syscall the async request was tagged with (`"open"`, `"read"`, ...).
    pub syscall: &'static str,
}

/// A module-loader failure: always carries the module name that failed to
/// resolve or load.
#[derive(Debug, Error, Clone)]
#[error("module not found: {name}")]
pub struct LoaderError {
    /// The requested (possibly unnormalized) module name.
    pub name: String,
}

/// A TLS-layer failure, mapped from the underlying `rustls` error.
#[derive(Debug, Error, Clone)]
#[error("tls error: {message}")]
pub struct TlsError {
    /// Human-readable, rustls-derived message.
    pub message: String,
    /// Populated when the failure was a certificate verification failure.
    pub verify_result: Option<String>,
}

/// A host entry point received an argument of the wrong JS type.
#[derive(Debug, Error, Clone)]
#[error("argument error: {0}")]
pub struct ArgumentError(pub String);

/// The union of every error taxonomy member, used as the `Err` type for
/// internal host functions before they are translated into a JS exception or
/// rejected promise at the boundary.
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`FileError`].
    #[error(transparent)]
    File(#[from] FileError),
    /// See [`LoaderError`].
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// See [`TlsError`].
    #[error(transparent)]
    Tls(#[from] TlsError),
    /// See [`ArgumentError`].
    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> Self {
        RuntimeError::Transport(TransportError::from_io(&err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_negates_raw_os_error() {
        let io_err = io::Error::from_raw_os_error(2);
        let err = TransportError::from_io(&io_err);
        assert_eq!(err.errno, -2);
        assert_eq!(err.code, "UV_ERROR");
    }

    #[test]
    fn file_error_keeps_syscall_and_path() {
        let transport = TransportError::from_io(&io::Error::from_raw_os_error(13));
        let err = FileError {
            transport,
            path: Some("/etc/shadow".into()),
            syscall: "open",
        };
        assert_eq!(err.syscall, "open");
        assert_eq!(err.path.as_deref(), Some("/etc/shadow"));
    }
}
