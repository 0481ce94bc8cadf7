//! slirc-bot - a resilient IRC bot connection layer.
//!
//! The crate is organised around one long-lived [`Connection`] per
//! process:
//!
//! - [`connection`]: socket ownership, registration, the read/write/
//!   ping loops, and the outbound command surface
//! - [`broadcast`]: fan-out of parsed messages to handler queues
//! - [`dispatch`]: handler tasks, permissions, command and response
//!   matchers
//! - [`flood`]: outbound pacing
//! - [`handoff`]: zero-downtime process restarts over a live socket
//! - [`bot`]: the supervisor tying it all together
//!
//! Wire-level concerns (framing, parsing, CTCP) live in the
//! [`slirc_line`] crate.
//!
//! [`Connection`]: connection::Connection

pub mod bot;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod flood;
pub mod handoff;

pub use bot::Bot;
pub use broadcast::{Hub, Subscription};
pub use config::Config;
pub use connection::Connection;
pub use dispatch::{CancelToken, Handlers, Permission};
pub use error::{ConnectionError, HandoffError};
