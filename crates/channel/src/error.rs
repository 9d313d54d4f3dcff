//! Channel Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A channel error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. End-of-data is deliberately **not** here — it is a normal
/// read result ([`ReadOutcome::Eof`](crate::ReadOutcome::Eof)), not an
/// error.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Operation invoked after the channel (or source/store handle) was closed
    #[display("channel is closed")]
    Closed,
    /// Mutating operation on a read-only channel
    #[display("unsupported operation: {_0}")]
    Unsupported(#[error(not(source))] &'static str),
    /// Source or cache file does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Underlying I/O error from the source or the cache store
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Cache store rejected an operation (e.g. a read of never-written bytes)
    #[display("cache store error: {_0}")]
    Store(#[error(not(source))] String),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// The channel itself never retries; retry policy belongs to the layer
    /// driving it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
