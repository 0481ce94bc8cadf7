//! Message parsing.
//!
//! One received line becomes one immutable [`Message`], following the
//! RFC1459 grammar:
//!
//! ```text
//! [':' prefix SPACE] command [SPACE parameter]* [SPACE ':' trailing]
//! ```
//!
//! The trailing parameter (introduced by the first ` :`) may contain
//! spaces and is appended as the final argument.

use std::str::FromStr;

use crate::error::LineError;
use crate::source::Source;

/// A parsed inbound IRC message.
///
/// Constructed once per line by the parser and immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The raw line as received, CRLF stripped.
    pub raw: String,
    /// The prefix without the leading `:`, or empty if absent.
    pub prefix: String,
    /// Decomposed `nick!user@host` components of the prefix.
    pub source: Source,
    /// Command verb or numeric reply code, uppercased.
    pub command: String,
    /// Ordered arguments; the trailing parameter, if any, is last.
    pub args: Vec<String>,
}

impl Message {
    /// Parse one line with CRLF already stripped.
    pub fn parse(line: &str) -> Result<Self, LineError> {
        if line.is_empty() {
            return Err(LineError::Empty);
        }

        let mut rest = line;
        let mut prefix = "";
        if let Some(tail) = rest.strip_prefix(':') {
            match tail.split_once(' ') {
                Some((p, r)) => {
                    prefix = p;
                    rest = r;
                }
                None => return Err(LineError::MissingCommand(line.to_owned())),
            }
        }

        // Split off the trailing parameter at the *first* " :".
        let (middle, trailing) = match rest.split_once(" :") {
            Some((m, t)) => (m, Some(t)),
            None => (rest, None),
        };

        let mut args: Vec<String> = middle.split_whitespace().map(str::to_owned).collect();
        if let Some(t) = trailing {
            args.push(t.to_owned());
        }
        if args.is_empty() {
            return Err(LineError::MissingCommand(line.to_owned()));
        }
        let command = args.remove(0).to_uppercase();

        Ok(Self {
            raw: line.to_owned(),
            prefix: prefix.to_owned(),
            source: Source::parse(prefix),
            command,
            args,
        })
    }

    /// Argument at position `i`, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    /// The last argument, or `""` when there are none.
    ///
    /// For PRIVMSG/NOTICE this is the message text.
    pub fn text(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or("")
    }

    /// Derive the channel this message was sent to.
    ///
    /// The first argument is the channel unless it is our own nickname,
    /// in which case the message is a direct message and there is no
    /// channel.
    pub fn channel(&self, current_nick: &str) -> Option<&str> {
        self.arg(0).filter(|target| *target != current_nick)
    }
}

impl FromStr for Message {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let msg = Message::parse(":nick!user@host COMMAND arg1 arg2 :trailing text").unwrap();
        assert_eq!(msg.prefix, "nick!user@host");
        assert_eq!(msg.source.nick, "nick");
        assert_eq!(msg.source.user, "user");
        assert_eq!(msg.source.host, "host");
        assert_eq!(msg.command, "COMMAND");
        assert_eq!(msg.args, vec!["arg1", "arg2", "trailing text"]);
    }

    #[test]
    fn test_parse_no_prefix() {
        let msg = Message::parse("PING :12345").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["12345"]);
        assert_eq!(msg.prefix, "");
        assert!(!msg.source.is_user());
    }

    #[test]
    fn test_command_uppercased() {
        let msg = Message::parse(":irc.example.net notice * :checking ident").unwrap();
        assert_eq!(msg.command, "NOTICE");
    }

    #[test]
    fn test_trailing_split_at_first_colon() {
        let msg = Message::parse("PRIVMSG #chan :one :two :three").unwrap();
        assert_eq!(msg.args, vec!["#chan", "one :two :three"]);
    }

    #[test]
    fn test_no_arguments() {
        let msg = Message::parse("QUIT").unwrap();
        assert_eq!(msg.command, "QUIT");
        assert!(msg.args.is_empty());
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_empty_line_rejected() {
        assert!(matches!(Message::parse(""), Err(LineError::Empty)));
    }

    #[test]
    fn test_prefix_without_command_rejected() {
        assert!(matches!(
            Message::parse(":lonelyprefix"),
            Err(LineError::MissingCommand(_))
        ));
    }

    #[test]
    fn test_channel_derivation() {
        let msg = Message::parse(":alice!a@h PRIVMSG #pony :hi").unwrap();
        assert_eq!(msg.channel("grainbot"), Some("#pony"));

        let dm = Message::parse(":alice!a@h PRIVMSG grainbot :hi").unwrap();
        assert_eq!(dm.channel("grainbot"), None);
    }

    #[test]
    fn test_numeric_reply() {
        let msg = Message::parse(":irc.example.net 001 grain :Welcome to IRC").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.arg(0), Some("grain"));
        assert_eq!(msg.text(), "Welcome to IRC");
    }

    #[test]
    fn test_from_str() {
        let msg: Message = ":server 433 * grain :Nickname is already in use".parse().unwrap();
        assert_eq!(msg.command, "433");
    }
}
