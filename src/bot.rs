//! Bot supervisor: process lifecycle around one [`Connection`].
//!
//! The supervisor owns three concerns the connection itself stays out
//! of: adopting an inherited socket at startup, reconnecting after
//! I/O failures, and translating Unix signals into quit or handoff
//! decisions.

use anyhow::Context;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::handoff::{self, Lifecycle, Signals};

/// Top-level bot process state.
pub struct Bot {
    config: Config,
    connection: Connection,
}

impl Bot {
    /// Build a bot from loaded configuration.
    pub fn new(config: Config) -> Self {
        let connection = Connection::new(config.server.clone(), config.timing.clone());
        Self { config, connection }
    }

    /// The underlying connection, for handler registration.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until a termination signal arrives.
    ///
    /// Connects (or adopts a predecessor's socket), supervises
    /// reconnects, and services lifecycle signals. The first SIGUSR2
    /// hands the socket to a successor process; a second one, or any
    /// termination signal, quits.
    pub async fn run(&self) -> anyhow::Result<()> {
        match handoff::inherited_socket().context("inspecting inherited socket")? {
            Some(stream) => {
                handoff::signal_parent().context("signalling predecessor")?;
                handoff::clear_restart_env();
                stream
                    .set_nonblocking(true)
                    .context("preparing inherited socket")?;
                let socket = tokio::net::TcpStream::from_std(stream)
                    .context("registering inherited socket")?;
                self.connection.connect_with(socket)?;
            }
            None => self.connection.connect().await?,
        }

        self.spawn_supervisor();

        let mut signals = Signals::new().context("installing signal handlers")?;
        let mut forked = false;
        loop {
            match signals.recv().await {
                Lifecycle::Quit => {
                    info!("termination signal received");
                    break;
                }
                Lifecycle::Restart if !forked => match self.handoff().await {
                    Ok(pid) => {
                        info!(pid, "handoff complete; awaiting successor");
                        forked = true;
                    }
                    Err(e) => error!(error = %e, "handoff failed; continuing to run"),
                },
                Lifecycle::Restart => {
                    info!("second restart signal; quitting");
                    break;
                }
            }
        }

        if self.connection.is_connected() {
            self.connection.begin_shutdown();
            self.connection.quit();
            // Give the writer a beat to flush the QUIT line.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = self.connection.disconnect().await;
        }
        Ok(())
    }

    /// Hand the live socket to a freshly spawned successor.
    ///
    /// Ordering matters: the descriptor must be duplicated before the
    /// connection's loops drop their halves, and the duplicate must
    /// stay open until after the successor is running.
    async fn handoff(&self) -> anyhow::Result<u32> {
        let info = self
            .connection
            .handoff_info()
            .ok_or(crate::error::ConnectionError::NoSocket)?;

        let keep = handoff::prepare_handoff(info.fd, &info.peer)?;
        self.connection.restart().await?;
        let pid = handoff::spawn_successor()?;
        drop(keep);
        Ok(pid)
    }

    /// Reconnect after I/O failures until shutdown begins.
    fn spawn_supervisor(&self) {
        let conn = self.connection.clone();
        let delay = self.config.timing.reconnect_delay();
        tokio::spawn(async move {
            loop {
                let Some(mut errors) = conn.take_errors() else {
                    return;
                };
                match errors.recv().await {
                    // Senders gone without an error: deliberate teardown.
                    None => {
                        if conn.is_shutting_down() {
                            return;
                        }
                    }
                    Some(e) => {
                        if conn.is_shutting_down() {
                            return;
                        }
                        warn!(error = %e, "connection failed");
                        loop {
                            tokio::time::sleep(delay).await;
                            if conn.is_shutting_down() {
                                return;
                            }
                            match conn.reconnect().await {
                                Ok(()) => {
                                    info!("reconnected");
                                    break;
                                }
                                Err(e) => warn!(error = %e, "reconnect failed; retrying"),
                            }
                        }
                    }
                }
            }
        });
    }
}
