//! Shared test fixtures: an in-process mock IRC server.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use slirc_bot::config::{ServerConfig, TimingConfig};

/// How long any single read may take before the test fails.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP listener standing in for an IRC server.
pub struct MockServer {
    listener: TcpListener,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Plain-TCP client settings pointing at this server.
    pub fn server_config(&self, nick: &str) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: self.port(),
            tls: false,
            nick: nick.to_string(),
            username: "testbot".to_string(),
            realname: "Test Bot".to_string(),
            password: None,
        }
    }

    pub fn timing(&self) -> TimingConfig {
        TimingConfig::default()
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> MockSession {
        let (stream, _) = self.listener.accept().await.unwrap();
        let (read, write) = stream.into_split();
        MockSession {
            reader: BufReader::new(read),
            writer: write,
        }
    }
}

/// One accepted connection, with line-oriented helpers.
pub struct MockSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockSession {
    /// Read one line from the bot, stripped of CRLF.
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line from the bot")
            .unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Read one line and assert it starts with `prefix`.
    pub async fn expect(&mut self, prefix: &str) -> String {
        let line = self.read_line().await;
        assert!(
            line.starts_with(prefix),
            "expected line starting with {prefix:?}, got {line:?}"
        );
        line
    }

    /// Send one CRLF-terminated line to the bot.
    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Drain the bot's registration (NICK then USER).
    pub async fn drain_registration(&mut self) {
        self.expect("NICK ").await;
        self.expect("USER ").await;
    }

    /// Complete registration and confirm `nick` with a 001 welcome.
    pub async fn welcome(&mut self, nick: &str) {
        self.drain_registration().await;
        self.send_line(&format!(":irc.test 001 {nick} :Welcome to the test network"))
            .await;
    }
}
