//! slirc-line - the RFC1459 line protocol layer.
//!
//! This crate covers the pure, I/O-free pieces of the legacy IRC client
//! protocol: CRLF line framing ([`LineCodec`]), message parsing
//! ([`Message`]), prefix decomposition ([`Source`]), and CTCP framing
//! ([`ctcp`]). It deliberately targets the RFC1459 subset a bot needs;
//! there is no IRCv3 capability or message-tag support here.

pub mod codec;
pub mod ctcp;
pub mod error;
pub mod message;
pub mod source;

pub use codec::LineCodec;
pub use ctcp::{Ctcp, CtcpKind};
pub use error::LineError;
pub use message::Message;
pub use source::Source;

/// Maximum length of one IRC line including CRLF, per RFC1459.
pub const MAX_LINE_LEN: usize = 512;
