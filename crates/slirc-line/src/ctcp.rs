//! CTCP (Client-to-Client Protocol) framing.
//!
//! CTCP layers structured queries inside PRIVMSG and NOTICE payloads,
//! delimited by the `\x01` byte. Only the legacy query subset a bot
//! answers is modelled here.
//!
//! # Example
//!
//! ```
//! use slirc_line::ctcp::{Ctcp, CtcpKind};
//!
//! let ctcp = Ctcp::parse("\x01ACTION waves hello\x01").unwrap();
//! assert_eq!(ctcp.kind, CtcpKind::Action);
//! assert_eq!(ctcp.params, Some("waves hello"));
//!
//! assert_eq!(Ctcp::quote("ACTION", "dances"), "\x01ACTION dances\x01");
//! ```

use std::fmt;

/// The CTCP delimiter character (`\x01`).
pub const CTCP_DELIM: char = '\x01';

/// Known CTCP query types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CtcpKind {
    /// ACTION - describes an action performed by the user (`/me`).
    Action,
    /// VERSION - requests client version information.
    Version,
    /// PING - measures round-trip latency.
    Ping,
    /// TIME - requests local time from the client.
    Time,
    /// USERINFO - requests user-defined information.
    Userinfo,
    /// CLIENTINFO - requests the list of supported CTCP queries.
    Clientinfo,
    /// Unknown or custom CTCP query.
    Unknown(String),
}

impl CtcpKind {
    /// Parse a CTCP query name.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            "TIME" => Self::Time,
            "USERINFO" => Self::Userinfo,
            "CLIENTINFO" => Self::Clientinfo,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical uppercase name of this query.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Time => "TIME",
            Self::Userinfo => "USERINFO",
            Self::Clientinfo => "CLIENTINFO",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CtcpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed CTCP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The query type.
    pub kind: CtcpKind,
    /// Parameters following the query name, if any.
    pub params: Option<&'a str>,
    /// The full body between the delimiters.
    pub body: &'a str,
}

impl<'a> Ctcp<'a> {
    /// Parse a CTCP message from a PRIVMSG/NOTICE body.
    ///
    /// Returns `None` when the text is not delimiter-framed or the body
    /// is empty.
    pub fn parse(text: &'a str) -> Option<Self> {
        let body = text
            .strip_prefix(CTCP_DELIM)?
            .strip_suffix(CTCP_DELIM)?;
        if body.is_empty() {
            return None;
        }

        let (name, params) = match body.split_once(' ') {
            Some((name, rest)) => (name, Some(rest)),
            None => (body, None),
        };

        Some(Self {
            kind: CtcpKind::parse(name),
            params,
            body,
        })
    }

    /// Frame a query and its parameters with the CTCP delimiters.
    pub fn quote(name: &str, params: &str) -> String {
        if params.is_empty() {
            format!("{CTCP_DELIM}{name}{CTCP_DELIM}")
        } else {
            format!("{CTCP_DELIM}{name} {params}{CTCP_DELIM}")
        }
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CTCP_DELIM}{}{CTCP_DELIM}", self.body)
    }
}
