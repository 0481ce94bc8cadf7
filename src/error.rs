//! Unified error handling for slirc-bot.
//!
//! Connection lifecycle and process-handoff failures each get their own
//! taxonomy; handler callback failures are reported through `anyhow` at
//! the dispatch boundary and never propagate past it.

use thiserror::Error;

/// Errors from connection lifecycle calls.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect` was called while a socket is already live.
    #[error("already connected")]
    AlreadyConnected,

    /// A lifecycle call that requires a live connection found none.
    #[error("not connected")]
    NotConnected,

    /// A handoff-style connect was attempted without a socket.
    #[error("no socket found")]
    NoSocket,

    /// The configured host is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    ServerName(String),

    /// Dialing the server failed.
    #[error("dial failed: {0}")]
    Dial(#[source] std::io::Error),

    /// The TLS handshake failed.
    #[error("tls handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// Any other transport-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the process handoff protocol.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// A required `RESTART_*` environment variable is missing or empty.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    /// An environment variable held something other than a number.
    #[error("cannot parse {name}: {value:?}")]
    BadEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The inherited descriptor did not reconstruct into a connected socket.
    #[error("inherited fd {fd} is not a connected socket: {source}")]
    BadFd {
        /// The descriptor number from the environment.
        fd: i32,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Duplicating or re-flagging the descriptor failed.
    #[error("descriptor export failed: {0}")]
    Export(#[source] std::io::Error),

    /// Spawning the successor process failed.
    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    /// Delivering the quit signal to the predecessor failed.
    #[error("signalling predecessor failed: {0}")]
    Signal(#[source] std::io::Error),
}
