//! Protocol error types.

use thiserror::Error;

/// Errors produced by the line codec and the message parser.
#[derive(Debug, Error)]
pub enum LineError {
    /// The line was empty after CRLF stripping.
    #[error("empty line")]
    Empty,

    /// The line carried a prefix but no command token.
    #[error("line has no command: {0:?}")]
    MissingCommand(String),

    /// A line exceeded the protocol length limit.
    ///
    /// The offending bytes have already been consumed from the read
    /// buffer, so the stream can keep going after this error.
    #[error("line too long: {actual} bytes (limit {limit})")]
    TooLong {
        /// Observed length in bytes.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A received line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos}")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        byte_pos: usize,
    },

    /// An I/O error from the underlying transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LineError {
    /// Whether the reader may continue consuming lines after this error.
    ///
    /// Only transport errors are fatal; malformed input is logged and
    /// skipped by callers.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
