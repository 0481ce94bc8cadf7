//! Configuration loading and management.
//!
//! Configuration is one TOML file with three sections: `[server]` for
//! the IRC server identity, `[timing]` for the keepalive and reconnect
//! knobs, and `[modules]` for free-form per-module settings. Module
//! settings are decoded once at load time into the tagged [`Value`]
//! variant; accessors are total functions over the variant, so feature
//! code never does runtime type assertions.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// IRC server and identity settings.
    pub server: ServerConfig,
    /// Keepalive, timeout and reconnect settings.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Free-form module settings, decoded into tagged variants.
    #[serde(default)]
    pub modules: HashMap<String, Value>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// IRC server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server hostname (e.g. "irc.libera.chat").
    pub host: String,
    /// Server port (default: 6697).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to wrap the connection in TLS (default: true).
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Nickname to claim.
    pub nick: String,
    /// Username supplied in the USER registration line.
    pub username: String,
    /// Real name; falls back to the username when empty.
    #[serde(default)]
    pub realname: String,
    /// Server password (PASS), if the server requires one.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    6697
}

fn default_tls() -> bool {
    true
}

/// Keepalive and reconnect timing, all in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Socket read/write deadline.
    pub timeout: u64,
    /// Unconditional PING cadence.
    pub ping_frequency: u64,
    /// Idle threshold before a keepalive PING is sent.
    pub keep_alive: u64,
    /// Cadence of attempts to reclaim the configured nickname.
    pub nick_reclaim: u64,
    /// Fixed delay between reconnect attempts after an I/O error.
    pub reconnect_delay: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            ping_frequency: 15 * 60,
            keep_alive: 4 * 60,
            nick_reclaim: 60 * 60,
            reconnect_delay: 10,
        }
    }
}

impl TimingConfig {
    /// Socket read/write deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Unconditional PING cadence.
    pub fn ping_frequency(&self) -> Duration {
        Duration::from_secs(self.ping_frequency)
    }

    /// Idle threshold before a keepalive PING.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive)
    }

    /// Nick reclaim cadence.
    pub fn nick_reclaim(&self) -> Duration {
        Duration::from_secs(self.nick_reclaim)
    }

    /// Delay between reconnect attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }
}

/// A tagged module-setting value.
///
/// Decoded once at load time; variant order matters for the untagged
/// representation (bool before integer before float, datetime before
/// string).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean flag.
    Boolean(bool),
    /// A whole number.
    Integer(i64),
    /// A floating-point number.
    Float(f64),
    /// A TOML datetime.
    Timestamp(toml::value::Datetime),
    /// A string.
    String(String),
    /// A list of strings.
    List(Vec<String>),
}

impl Value {
    /// The boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The float value; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The list value, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// The timestamp value, if this is a datetime.
    pub fn as_timestamp(&self) -> Option<&toml::value::Datetime> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r##"
[server]
host = "irc.example.net"
nick = "grain"
username = "grainbot"
realname = "Grain Bot"

[timing]
timeout = 20

[modules]
autojoin = ["#pony", "#test"]
greeting = "hello"
lucky_number = 7
chatty = true
pi = 3.14
since = 2024-05-01T00:00:00Z
"##;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.host, "irc.example.net");
        assert_eq!(config.server.port, 6697);
        assert!(config.server.tls);
        assert_eq!(config.server.password, None);
        assert_eq!(config.timing.timeout(), Duration::from_secs(20));
        // Unset timing fields keep their defaults.
        assert_eq!(config.timing.ping_frequency(), Duration::from_secs(900));
    }

    #[test]
    fn test_module_values_decode_to_variants() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let modules = &config.modules;

        assert_eq!(
            modules["autojoin"].as_list(),
            Some(&["#pony".to_string(), "#test".to_string()][..])
        );
        assert_eq!(modules["greeting"].as_str(), Some("hello"));
        assert_eq!(modules["lucky_number"].as_int(), Some(7));
        assert_eq!(modules["chatty"].as_bool(), Some(true));
        assert_eq!(modules["pi"].as_float(), Some(3.14));
        assert!(modules["since"].as_timestamp().is_some());

        // Accessors are total: wrong variant is None, never a panic.
        assert_eq!(modules["greeting"].as_int(), None);
        assert_eq!(modules["lucky_number"].as_float(), Some(7.0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.nick, "grain");
    }

    #[test]
    fn test_missing_file_errors() {
        let err = Config::load("/nonexistent/slircbot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_missing_host_errors() {
        let err = toml::from_str::<Config>("[server]\nnick = \"a\"\nusername = \"b\"")
            .unwrap_err();
        assert!(err.to_string().contains("host"));
    }
}
