//! Error types for albumfs
//!
//! This module provides error types for the filesystem adapter and the
//! remote resource layer with the following design goals:
//! - Every variant maps onto exactly one errno for the mount layer
//! - Transport details stay out of the message (no tokens, no headers)
//! - Local classification errors are distinct from remote failures

use thiserror::Error;

/// Result type alias using albumfs's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// albumfs error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Path does not name an album, photo or pending upload.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path is already occupied by an album, photo or upload buffer.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Operation is disabled by configuration or not allowed at this path.
    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    /// Write or flush on a path with no open upload buffer.
    #[error("no upload buffer for {0}")]
    BufferNotReady(String),

    /// Unsupported open mode.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Directory operation on a photo.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// File operation on an album or the root.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Album still holds photos.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Remote call failed after retries were exhausted, or failed fatally.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Remote document was malformed or lacked a required link.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Local I/O error from the upload staging area.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// errno reported to the kernel for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::AlreadyExists(_) => libc::EEXIST,
            Error::NotPermitted(_) => libc::EPERM,
            Error::AccessDenied(_) => libc::EACCES,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::IsADirectory(_) => libc::EISDIR,
            Error::NotEmpty(_) => libc::ENOTEMPTY,
            Error::BufferNotReady(_)
            | Error::TransportFailure(_)
            | Error::ProtocolError(_)
            | Error::Io(_) => libc::EIO,
        }
    }

    /// True for errors produced by the remote side rather than local state.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::TransportFailure(_) | Error::ProtocolError(_))
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }
}
