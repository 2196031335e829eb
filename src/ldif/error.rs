//! Custom error types for the ldif-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum LdifError {
    /// An error originating from the underlying byte streams.
    ///
    /// I/O failures are surfaced unchanged and do not count against the
    /// reject statistics.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be parsed as LDIF.
    #[error("line {line}: {message}")]
    Parse {
        /// The line number the offending record starts on (1-based).
        line: u64,
        /// A human-readable description of the problem.
        message: String,
        /// Whether the reader is still in sync and can move on to the
        /// next record.
        can_continue: bool,
    },
}

impl LdifError {
    /// A parse error after which reading may continue with the next record.
    pub(crate) fn parse(line: u64, message: impl Into<String>) -> Self {
        LdifError::Parse { line, message: message.into(), can_continue: true }
    }

    /// A parse error that leaves the reader out of sync with the stream.
    pub(crate) fn parse_fatal(line: u64, message: impl Into<String>) -> Self {
        LdifError::Parse { line, message: message.into(), can_continue: false }
    }

    /// The source line number this error is tagged with, if any.
    pub fn line(&self) -> Option<u64> {
        match self {
            LdifError::Parse { line, .. } => Some(*line),
            LdifError::Io(_) => None,
        }
    }

    /// Whether the caller can keep reading records after this error.
    pub fn can_continue(&self) -> bool {
        match self {
            LdifError::Parse { can_continue, .. } => *can_continue,
            LdifError::Io(_) => false,
        }
    }
}

/// A convenience `Result` type alias using the crate's `LdifError` type.
pub type Result<T> = std::result::Result<T, LdifError>;
