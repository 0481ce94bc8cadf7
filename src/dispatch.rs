//! Handler dispatch: subscriptions, permissions and cancellation.
//!
//! Each registered handler runs in its own task over a private hub
//! subscription, so a slow or panicking handler can never stall the
//! reader loop or its siblings. Callbacks are synchronous and run
//! under `catch_unwind`; a panic is logged and the handler keeps
//! serving subsequent messages.
//!
//! On top of raw message handlers sit two matcher wrappers:
//! [`Command`] for dot-prefixed commands (`.roll 2d6`) and
//! [`Response`] for regex triggers on conversational text. Permission
//! checks on raw handlers skip silently; the wrappers check after
//! matching and notify the sender, so a denial notice only ever
//! answers an attempted invocation, never ambient chatter.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use regex::Regex;
use slirc_line::{Message, Source};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::broadcast::RecvError;
use crate::connection::Connection;

/// Queue capacity for each handler's private subscription.
const HANDLER_QUEUE_DEPTH: usize = 64;

/// Reply sent when a permission predicate rejects a sender.
const PERMISSION_DENIED: &str = "You don't have permission to do that.";

/// Dispatch registry errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler with this name is already registered.
    #[error("handler already registered: {0}")]
    DuplicateName(String),
    /// No handler with this name is registered.
    #[error("no such handler: {0}")]
    UnknownName(String),
}

/// Decides whether a message sender may trigger a handler.
pub trait Permission: Send + Sync {
    /// Whether `source` passes this check.
    fn validate(&self, source: &Source) -> bool;
}

/// Permission satisfied by any sender.
pub struct AnySender;

impl Permission for AnySender {
    fn validate(&self, _source: &Source) -> bool {
        true
    }
}

/// Permission matching the sender's full mask against a regex.
pub struct MaskPermission {
    pattern: Regex,
}

impl MaskPermission {
    /// Build from a regex over `nick!user@host`.
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl Permission for MaskPermission {
    fn validate(&self, source: &Source) -> bool {
        let mask = format!("{}!{}@{}", source.nick, source.user, source.host);
        self.pattern.is_match(&mask)
    }
}

/// Cooperative cancellation handle for one handler task.
///
/// Clones share the same flag. Cancellation is one-way and idempotent.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// New, uncancelled token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    /// Request cancellation. Returns `true` on the first call only.
    pub fn cancel(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        if first {
            let _ = self.tx.send(true);
        }
        first
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A message handler callback.
///
/// Runs on a dispatch task; errors are logged, panics are contained.
pub type Callback = Arc<dyn Fn(&Message, &Connection) -> anyhow::Result<()> + Send + Sync>;

/// Spawn a dispatch task feeding `callback` from a new subscription.
///
/// The returned token stops the task at its next suspension point.
pub fn add_handler(
    conn: &Connection,
    permission: Option<Arc<dyn Permission>>,
    callback: Callback,
) -> CancelToken {
    let token = CancelToken::new();
    let task_token = token.clone();
    let conn = conn.clone();
    let mut sub = conn.subscribe(HANDLER_QUEUE_DEPTH);

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = task_token.cancelled() => return,
                received = sub.recv() => match received {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "handler fell behind; messages dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                },
            };

            // Rejection here is silent: this layer sees every broadcast
            // message, not just attempted invocations.
            if let Some(permission) = &permission {
                if !permission.validate(&msg.source) {
                    debug!(nick = %msg.source.nick, "sender rejected by permission check");
                    continue;
                }
            }

            invoke(&callback, &msg, &conn);
        }
    });

    token
}

/// Check a matched invocation against its permission.
///
/// Rejection notifies the sender; unlike the raw-handler check, this
/// only ever runs for messages that actually invoked the handler.
fn permitted(permission: &Option<Arc<dyn Permission>>, msg: &Message, conn: &Connection) -> bool {
    let Some(permission) = permission else {
        return true;
    };
    if permission.validate(&msg.source) {
        return true;
    }
    debug!(nick = %msg.source.nick, "invocation rejected by permission check");
    if !msg.source.nick.is_empty() {
        conn.notice(&msg.source.nick, PERMISSION_DENIED);
    }
    false
}

/// Run one callback, containing panics.
fn invoke(callback: &Callback, msg: &Message, conn: &Connection) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| callback(msg, conn)));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, command = %msg.command, "handler failed"),
        Err(_) => error!(command = %msg.command, "handler panicked; continuing"),
    }
}

/// Named registry of handler tasks for one connection.
///
/// Registration and removal may race freely from feature code; the map
/// itself is the only shared state.
pub struct Handlers {
    conn: Connection,
    entries: DashMap<String, CancelToken>,
}

impl Handlers {
    /// New registry bound to a connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            entries: DashMap::new(),
        }
    }

    /// Register a raw message handler under `name`.
    pub fn add_handler(
        &self,
        name: &str,
        permission: Option<Arc<dyn Permission>>,
        callback: Callback,
    ) -> Result<(), DispatchError> {
        if self.entries.contains_key(name) {
            return Err(DispatchError::DuplicateName(name.to_owned()));
        }
        let token = add_handler(&self.conn, permission, callback);
        if self.entries.insert(name.to_owned(), token.clone()).is_some() {
            // Lost a registration race; withdraw our task.
            token.cancel();
            return Err(DispatchError::DuplicateName(name.to_owned()));
        }
        debug!(name, "handler registered");
        Ok(())
    }

    /// Register a dot-command handler (`.name args`).
    ///
    /// The callback sees only messages that match the command; see
    /// [`Command::parse`] for the matching rules. The permission check
    /// runs after matching, so only an attempted invocation can draw a
    /// denial notice.
    pub fn add_command(
        &self,
        name: &str,
        permission: Option<Arc<dyn Permission>>,
        callback: impl Fn(&Command<'_>, &Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<(), DispatchError> {
        let command = name.to_owned();
        self.add_handler(
            name,
            None,
            Arc::new(move |msg, conn| {
                match Command::parse(msg, &command, &conn.current_nick()) {
                    Some(cmd) if permitted(&permission, msg, conn) => callback(&cmd, conn),
                    _ => Ok(()),
                }
            }),
        )
    }

    /// Register a conversational trigger handler.
    ///
    /// The callback sees only messages that match the pattern; see
    /// [`Response::parse`] for the matching rules. As with commands,
    /// the permission check applies to matched invocations only.
    pub fn add_response(
        &self,
        name: &str,
        pattern: Regex,
        permission: Option<Arc<dyn Permission>>,
        callback: impl Fn(&Response<'_>, &Connection) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Result<(), DispatchError> {
        self.add_handler(
            name,
            None,
            Arc::new(move |msg, conn| {
                match Response::parse(msg, &pattern, &conn.current_nick()) {
                    Some(resp) if permitted(&permission, msg, conn) => callback(&resp, conn),
                    _ => Ok(()),
                }
            }),
        )
    }

    /// Cancel and remove the handler registered under `name`.
    pub fn remove(&self, name: &str) -> Result<(), DispatchError> {
        match self.entries.remove(name) {
            Some((_, token)) => {
                token.cancel();
                debug!(name, "handler removed");
                Ok(())
            }
            None => Err(DispatchError::UnknownName(name.to_owned())),
        }
    }

    /// Cancel and remove every registered handler.
    pub fn clear(&self) {
        self.entries.retain(|name, token| {
            token.cancel();
            debug!(name = %name, "handler removed");
            false
        });
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A matched dot-command invocation.
pub struct Command<'a> {
    /// The message that triggered the command.
    pub message: &'a Message,
    /// Argument text after the command word, trimmed.
    pub text: &'a str,
}

impl<'a> Command<'a> {
    /// Match a message against a dot-command name.
    ///
    /// Matches PRIVMSG and NOTICE whose first whitespace-separated
    /// token is exactly `.name`. Messages addressed directly to us
    /// (target is our nick) are not commands; those belong to
    /// [`Response`] triggers.
    pub fn parse(message: &'a Message, name: &str, current_nick: &str) -> Option<Self> {
        if message.command != "PRIVMSG" && message.command != "NOTICE" {
            return None;
        }
        if message.arg(0) == Some(current_nick) {
            return None;
        }

        let text = message.text();
        let (word, rest) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest),
            None => (text, ""),
        };
        let invoked = word.strip_prefix('.')?;
        if invoked != name {
            return None;
        }

        Some(Self {
            message,
            text: rest.trim(),
        })
    }

    /// The channel the command came from.
    pub fn channel(&self, current_nick: &str) -> Option<&str> {
        self.message.channel(current_nick)
    }
}

/// A matched conversational trigger.
pub struct Response<'a> {
    /// The message that triggered the response.
    pub message: &'a Message,
    /// The text the pattern was matched against.
    pub text: &'a str,
    /// Capture groups from the match.
    pub captures: regex::Captures<'a>,
}

impl<'a> Response<'a> {
    /// Match a message against a conversational trigger pattern.
    ///
    /// Direct messages (target is our nick) are matched whole. Channel
    /// messages match only when prefixed with our nick plus one of
    /// ` `, `,`, `;` or `:`; the pattern then applies to the remainder.
    pub fn parse(message: &'a Message, pattern: &Regex, current_nick: &str) -> Option<Self> {
        if message.command != "PRIVMSG" && message.command != "NOTICE" {
            return None;
        }

        let text = message.text();
        let subject = if message.arg(0) == Some(current_nick) {
            text
        } else {
            let rest = text.strip_prefix(current_nick)?;
            let rest = rest.strip_prefix([' ', ',', ';', ':'])?;
            rest.trim_start()
        };

        let captures = pattern.captures(subject)?;
        Some(Self {
            message,
            text: subject,
            captures,
        })
    }
}
