//! Outbound IRC commands.
//!
//! Every method formats one protocol line and hands it to the write
//! queue via [`Connection::send_raw`]; none of them block or report
//! transport errors. Pacing is applied later by the writer loop's
//! flood control, and transport failures surface on the connection's
//! error channel.

use slirc_line::Ctcp;
use slirc_line::ctcp::CTCP_DELIM;
use tracing::{debug, warn};

use super::Connection;

impl Connection {
    /// Queue one raw protocol line for sending.
    ///
    /// Trailing CR/LF is stripped; framing is added by the codec. When
    /// disconnected, or when the queue is full, the line is dropped
    /// with a log entry rather than blocking the caller.
    pub fn send_raw(&self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(tx) = self.inner.outbound.lock().clone() else {
            debug!(line = %line, "not connected; dropping outbound line");
            return;
        };
        if let Err(e) = tx.try_send(line.to_owned()) {
            warn!(error = %e, "outbound queue unavailable; dropping line");
        }
    }

    /// Claim a nickname.
    ///
    /// The claimed nickname is tracked immediately; a 433/437 rejection
    /// or a NICK confirmation from the server corrects it afterwards.
    pub fn nick(&self, nick: &str) {
        *self.inner.current_nick.write() = nick.to_owned();
        self.send_raw(&format!("NICK {nick}"));
    }

    /// Leave the server with the default quit message.
    pub fn quit(&self) {
        self.quit_with("quit");
    }

    /// Leave the server with an explicit quit message.
    pub fn quit_with(&self, message: &str) {
        self.send_raw(&format!("QUIT :{message}"));
    }

    /// Join a channel.
    pub fn join(&self, channel: &str) {
        self.send_raw(&format!("JOIN {channel}"));
    }

    /// Leave a channel.
    pub fn part(&self, channel: &str) {
        self.send_raw(&format!("PART {channel}"));
    }

    /// Send a PRIVMSG to a channel or nick.
    pub fn privmsg(&self, target: &str, text: &str) {
        self.send_raw(&format!("PRIVMSG {target} :{text}"));
    }

    /// Send a NOTICE to a channel or nick.
    pub fn notice(&self, target: &str, text: &str) {
        self.send_raw(&format!("NOTICE {target} :{text}"));
    }

    /// Set modes on a target, e.g. `mode("#chan", &["+o", "friend"])`.
    pub fn mode(&self, target: &str, modes: &[&str]) {
        if modes.is_empty() {
            self.send_raw(&format!("MODE {target}"));
        } else {
            self.send_raw(&format!("MODE {target} {}", modes.join(" ")));
        }
    }

    /// Query information about a nick.
    pub fn whois(&self, nick: &str) {
        self.send_raw(&format!("WHOIS {nick}"));
    }

    /// List users matching a mask.
    pub fn who(&self, mask: &str) {
        self.send_raw(&format!("WHO {mask}"));
    }

    /// Send a PING with an arbitrary payload.
    pub fn ping(&self, payload: &str) {
        self.send_raw(&format!("PING :{payload}"));
    }

    /// Send a PING stamped with the current time in nanoseconds.
    ///
    /// The matching PONG handler parses the payload back to report the
    /// round-trip lag.
    pub fn ping_timestamp(&self) {
        let ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        self.ping(&ns.to_string());
    }

    /// Answer a server PING.
    pub fn pong(&self, payload: &str) {
        self.send_raw(&format!("PONG :{payload}"));
    }

    /// Send a CTCP query via PRIVMSG.
    pub fn ctcp(&self, target: &str, tag: &str, params: &str) {
        self.privmsg(target, &Ctcp::quote(tag, params));
    }

    /// Send a CTCP reply via NOTICE.
    pub fn ctcp_reply(&self, target: &str, tag: &str, params: &str) {
        self.notice(target, &Ctcp::quote(tag, params));
    }

    /// Send a CTCP reply echoing a raw body verbatim.
    pub(crate) fn ctcp_reply_body(&self, target: &str, body: &str) {
        self.notice(target, &format!("{CTCP_DELIM}{body}{CTCP_DELIM}"));
    }

    /// Send an action ("/me") to a channel or nick.
    pub fn action(&self, target: &str, text: &str) {
        self.ctcp(target, "ACTION", text);
    }
}
