//! Message origin decomposition.
//!
//! An IRC prefix is either a server name (e.g. `irc.example.com`) or a
//! user mask in `nick!user@host` form. A [`Source`] carries the user
//! components when the prefix matches that form and empty strings
//! otherwise, so handler code never has to re-parse the prefix.

/// Decomposed `nick!user@host` components of a message prefix.
///
/// All three fields are empty when the prefix does not match the user
/// mask form (server-only prefixes, or no prefix at all).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    /// Nickname before the `!`.
    pub nick: String,
    /// Username (ident) between `!` and `@`.
    pub user: String,
    /// Hostname after the `@`.
    pub host: String,
}

impl Source {
    /// Decompose a raw prefix string.
    ///
    /// Both `!` and `@` must be present, with the `!` coming first;
    /// anything else yields an empty `Source`.
    pub fn parse(prefix: &str) -> Self {
        match (prefix.find('!'), prefix.find('@')) {
            (Some(bang), Some(at)) if bang < at => Self {
                nick: prefix[..bang].to_owned(),
                user: prefix[bang + 1..at].to_owned(),
                host: prefix[at + 1..].to_owned(),
            },
            _ => Self::default(),
        }
    }

    /// Whether this source identifies a user (as opposed to a server).
    pub fn is_user(&self) -> bool {
        !self.nick.is_empty()
    }
}
