//! Connection - owns the socket and the read/write/ping loops.
//!
//! One `Connection` maintains a single logical link to one IRC server.
//! While connected it runs exactly three long-lived tasks:
//!
//! - **reader**: deadline-bounded line reads, parse, publish to the hub
//! - **writer**: drains the outbound queue through flood control
//! - **pinger**: keepalive PING, cadence PING, nickname reclaim
//!
//! All three observe a shared exit signal and stop cooperatively at
//! their next suspension point; `disconnect` waits for them to finish
//! before the socket is released. Handler code never touches the
//! socket: everything outbound goes through the queue.

pub mod commands;
pub mod stream;

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use slirc_line::ctcp::{Ctcp, CtcpKind};
use slirc_line::{LineCodec, LineError, Message};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::broadcast::{Hub, Subscription};
use crate::config::{ServerConfig, TimingConfig};
use crate::error::ConnectionError;
use crate::flood::FloodControl;
use stream::ClientStream;

/// Depth of the outbound write queue.
const OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// Callback invoked once per connection after the 001 welcome.
pub type WelcomeHook = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Socket identity retained for process handoff.
#[derive(Clone, Debug)]
pub struct HandoffInfo {
    /// Raw descriptor of the live socket.
    pub fd: RawFd,
    /// Descriptive peer name (`addr:port`).
    pub peer: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connected,
}

struct State {
    phase: Phase,
    restarting: bool,
    exit: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    server: ServerConfig,
    timing: TimingConfig,
    hub: Hub,
    state: Mutex<State>,
    current_nick: RwLock<String>,
    last_message: Mutex<Instant>,
    welcomed: AtomicBool,
    shutting_down: AtomicBool,
    welcome_hooks: Mutex<Vec<WelcomeHook>>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    error_rx: Mutex<Option<mpsc::Receiver<io::Error>>>,
    handoff: Mutex<Option<HandoffInfo>>,
}

/// A single logical link to one IRC server.
///
/// Cheap to clone; all clones share the same link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a disconnected connection from configuration.
    pub fn new(server: ServerConfig, timing: TimingConfig) -> Self {
        let nick = server.nick.clone();
        Self {
            inner: Arc::new(Inner {
                server,
                timing,
                hub: Hub::new(),
                state: Mutex::new(State {
                    phase: Phase::Disconnected,
                    restarting: false,
                    exit: None,
                    tasks: Vec::new(),
                }),
                current_nick: RwLock::new(nick),
                last_message: Mutex::new(Instant::now()),
                welcomed: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                welcome_hooks: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                error_rx: Mutex::new(None),
                handoff: Mutex::new(None),
            }),
        }
    }

    /// Dial the configured server and start the loops.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }
        let scheme = if self.inner.server.tls { "ircs" } else { "irc" };
        info!(
            host = %self.inner.server.host,
            port = self.inner.server.port,
            scheme,
            "connecting"
        );
        let stream = self.dial().await?;
        self.start(stream, false)
    }

    /// Adopt an inherited socket instead of dialing.
    ///
    /// Used only during process handoff: the server already has session
    /// state for this link, so registration is reduced to a NICK
    /// re-claim. The inherited descriptor is always treated as plain
    /// TCP; a TLS session cannot survive an exec.
    pub fn connect_with(&self, socket: TcpStream) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Err(ConnectionError::AlreadyConnected);
        }
        info!(peer = ?socket.peer_addr().ok(), "reusing inherited connection");
        self.inner.state.lock().restarting = true;
        self.start(ClientStream::Tcp(socket), true)
    }

    /// Stop the loops, wait for them, and release the socket.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let (exit, tasks, restarting) = {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Connected {
                return Err(ConnectionError::NotConnected);
            }
            state.phase = Phase::Disconnected;
            (state.exit.take(), std::mem::take(&mut state.tasks), state.restarting)
        };

        // Closing the queue and raising the exit signal unblocks all
        // three loops; wait for them before the halves are dropped.
        *self.inner.outbound.lock() = None;
        if let Some(exit) = exit {
            let _ = exit.send(true);
        }
        for task in tasks {
            let _ = task.await;
        }

        if !restarting {
            *self.inner.handoff.lock() = None;
            info!("server disconnected");
        }
        Ok(())
    }

    /// Disconnect and dial again with the same configuration.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        if let Err(e) = self.disconnect().await {
            debug!(error = %e, "reconnect: teardown skipped");
        }
        self.connect().await
    }

    /// Stop the loops for a process handoff.
    ///
    /// The server-side session stays alive: no QUIT is sent and the
    /// successor's duplicated descriptor keeps the socket open even
    /// though this process's own descriptors close with the loops.
    pub async fn restart(&self) -> Result<(), ConnectionError> {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.state.lock().restarting = true;
        self.disconnect().await
    }

    /// Whether the connection is currently live.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().phase == Phase::Connected
    }

    /// Mark that a deliberate shutdown is in progress, stopping the
    /// supervisor from reconnecting.
    pub fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Whether a deliberate shutdown or restart is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// The nickname currently claimed on the server.
    pub fn current_nick(&self) -> String {
        self.inner.current_nick.read().clone()
    }

    /// Subscribe to parsed inbound messages.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        self.inner.hub.subscribe(capacity)
    }

    /// Take the error receiver for the current connection, if any.
    ///
    /// I/O failures from all three loops arrive here; the supervising
    /// caller decides whether to reconnect.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<io::Error>> {
        self.inner.error_rx.lock().take()
    }

    /// Socket identity for process handoff, while connected.
    pub fn handoff_info(&self) -> Option<HandoffInfo> {
        self.inner.handoff.lock().clone()
    }

    /// Register a hook fired once per connection on the 001 welcome.
    pub fn on_welcome(&self, hook: impl Fn(&Connection) + Send + Sync + 'static) {
        self.inner.welcome_hooks.lock().push(Arc::new(hook));
    }

    async fn dial(&self) -> Result<ClientStream, ConnectionError> {
        let server = &self.inner.server;
        let tcp = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(ConnectionError::Dial)?;
        if !server.tls {
            return Ok(ClientStream::Tcp(tcp));
        }

        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            warn!(errors = ?native.errors, "some native root certificates failed to load");
        }
        let mut roots = rustls::RootCertStore::empty();
        for cert in native.certs {
            let _ = roots.add(cert);
        }
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let name = rustls::pki_types::ServerName::try_from(server.host.clone())
            .map_err(|_| ConnectionError::ServerName(server.host.clone()))?;
        let tls = TlsConnector::from(Arc::new(config))
            .connect(name, tcp)
            .await
            .map_err(ConnectionError::Tls)?;
        Ok(ClientStream::Tls(Box::new(tls)))
    }

    fn start(&self, stream: ClientStream, restarting: bool) -> Result<(), ConnectionError> {
        let peer = stream.peer_addr().ok();
        let fd = stream.raw_fd();
        info!(peer = ?peer, "connected");

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::new(read_half, LineCodec::new());
        let writer = FramedWrite::new(write_half, LineCodec::new());

        let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
        let (err_tx, err_rx) = mpsc::channel::<io::Error>(2);
        let (exit_tx, exit_rx) = watch::channel(false);

        *self.inner.current_nick.write() = self.inner.server.nick.clone();
        *self.inner.last_message.lock() = Instant::now();
        self.inner.welcomed.store(false, Ordering::SeqCst);
        self.inner.shutting_down.store(false, Ordering::SeqCst);
        *self.inner.outbound.lock() = Some(out_tx);
        *self.inner.error_rx.lock() = Some(err_rx);
        *self.inner.handoff.lock() = Some(HandoffInfo {
            fd,
            peer: peer.map(|a| a.to_string()).unwrap_or_default(),
        });

        let tasks = vec![
            tokio::spawn(self.clone().read_loop(reader, exit_rx.clone(), err_tx.clone())),
            tokio::spawn(self.clone().write_loop(writer, out_rx, exit_rx.clone(), err_tx)),
            tokio::spawn(self.clone().ping_loop(exit_rx)),
        ];

        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Connected;
            state.exit = Some(exit_tx);
            state.tasks = tasks;
        }

        self.register(restarting);
        self.inner.state.lock().restarting = false;
        Ok(())
    }

    /// Send the registration sequence for a fresh or inherited link.
    fn register(&self, restarting: bool) {
        let server = &self.inner.server;
        if restarting {
            self.nick(&server.nick);
            return;
        }
        if let Some(pass) = &server.password {
            self.send_raw(&format!("PASS {pass}"));
        }
        self.nick(&server.nick);
        let realname = if server.realname.is_empty() {
            &server.username
        } else {
            &server.realname
        };
        self.send_raw(&format!("USER {} 0.0.0.0 0.0.0.0 :{realname}", server.username));
    }

    async fn read_loop(
        self,
        mut reader: FramedRead<ReadHalf<ClientStream>, LineCodec>,
        mut exit: watch::Receiver<bool>,
        errors: mpsc::Sender<io::Error>,
    ) {
        // We always hear from the server within the ping frequency plus
        // the response timeout, so a breach here is a dead link.
        let deadline = self.inner.timing.timeout() + self.inner.timing.ping_frequency();
        loop {
            tokio::select! {
                _ = exit.changed() => return,
                next = tokio::time::timeout(deadline, reader.next()) => match next {
                    Err(_) => {
                        report(&errors, io::Error::new(io::ErrorKind::TimedOut, "read deadline breached"));
                        return;
                    }
                    Ok(None) => {
                        if !*exit.borrow() {
                            report(&errors, io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection"));
                        }
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        if e.is_fatal() {
                            if let LineError::Io(io_err) = e {
                                report(&errors, io_err);
                            }
                            return;
                        }
                        warn!(error = %e, "skipping unreadable line");
                    }
                    Ok(Some(Ok(line))) => self.handle_line(&line),
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        debug!(line = %line, "[RECV]");
        *self.inner.last_message.lock() = Instant::now();

        match line.parse::<Message>() {
            Ok(msg) => {
                self.handle_builtin(&msg);
                self.inner.hub.publish(Arc::new(msg));
            }
            Err(e) => warn!(error = %e, line = %line, "dropping malformed line"),
        }
    }

    async fn write_loop(
        self,
        mut writer: FramedWrite<WriteHalf<ClientStream>, LineCodec>,
        mut queue: mpsc::Receiver<String>,
        mut exit: watch::Receiver<bool>,
        errors: mpsc::Sender<io::Error>,
    ) {
        let mut flood = FloodControl::new();
        loop {
            tokio::select! {
                _ = exit.changed() => return,
                item = queue.recv() => {
                    let Some(line) = item else { return };

                    let delay = flood.delay(line.len());
                    if !delay.is_zero() {
                        debug!(delay_ms = delay.as_millis() as u64, "flood control delay");
                        tokio::time::sleep(delay).await;
                    }

                    debug!(line = %line, "[SEND]");
                    match tokio::time::timeout(self.inner.timing.timeout(), writer.send(line)).await {
                        Err(_) => {
                            report(&errors, io::Error::new(io::ErrorKind::TimedOut, "write deadline breached"));
                            return;
                        }
                        Ok(Err(LineError::Io(e))) => {
                            report(&errors, e);
                            return;
                        }
                        Ok(Err(e)) => {
                            report(&errors, io::Error::other(e));
                            return;
                        }
                        Ok(Ok(())) => {}
                    }
                }
            }
        }
    }

    async fn ping_loop(self, mut exit: watch::Receiver<bool>) {
        let mut keepalive = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut cadence = tokio::time::interval(self.inner.timing.ping_frequency());
        let mut reclaim = tokio::time::interval(self.inner.timing.nick_reclaim());
        // The first tick of an interval is immediate; consume it so the
        // timers start counting from now.
        keepalive.tick().await;
        cadence.tick().await;
        reclaim.tick().await;

        loop {
            tokio::select! {
                _ = exit.changed() => return,
                _ = keepalive.tick() => {
                    let idle = self.inner.last_message.lock().elapsed();
                    if idle >= self.inner.timing.keep_alive() {
                        debug!(idle_secs = idle.as_secs(), "idle; sending keepalive ping");
                        self.ping_timestamp();
                    }
                }
                _ = cadence.tick() => self.ping_timestamp(),
                _ = reclaim.tick() => {
                    let want = &self.inner.server.nick;
                    if self.current_nick() != *want {
                        info!(nick = %want, "attempting to reclaim configured nickname");
                        self.send_raw(&format!("NICK {want}"));
                    }
                }
            }
        }
    }

    /// Built-in protocol handlers, always active and not removable.
    ///
    /// Runs in the reader loop before the message is published, so
    /// nickname tracking is serialized ahead of any feature handler.
    fn handle_builtin(&self, msg: &Message) {
        match msg.command.as_str() {
            "PING" => self.pong(msg.text()),

            // Nickname collision: mutate and retry.
            "433" | "437" => {
                let mut nick = self.current_nick();
                if nick.len() > 8 {
                    nick.insert(0, '_');
                } else {
                    nick.push('_');
                }
                warn!(nick = %nick, "nickname in use; retrying");
                self.nick(&nick);
            }

            // Our own nick change confirmed by the server.
            "NICK" => {
                if msg.source.nick == self.current_nick() {
                    if let Some(new) = msg.arg(0) {
                        info!(nick = %new, "nickname changed");
                        *self.inner.current_nick.write() = new.to_owned();
                    }
                }
            }

            // Our pings carry a nanosecond timestamp payload.
            "PONG" => {
                if let Ok(sent_ns) = msg.text().parse::<i64>() {
                    let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
                    let lag = std::time::Duration::from_nanos(now_ns.saturating_sub(sent_ns).max(0) as u64);
                    info!(lag = ?lag, "server round trip");
                }
            }

            // Welcome: registration is complete.
            "001" => {
                if let Some(confirmed) = msg.arg(0) {
                    *self.inner.current_nick.write() = confirmed.to_owned();
                }
                if !self.inner.welcomed.swap(true, Ordering::SeqCst) {
                    info!("registration complete");
                    let hooks: Vec<WelcomeHook> = self.inner.welcome_hooks.lock().clone();
                    for hook in hooks {
                        hook(self);
                    }
                }
            }

            "PRIVMSG" | "NOTICE" => self.handle_ctcp(msg),

            _ => {}
        }
    }

    /// Answer CTCP queries addressed to us.
    fn handle_ctcp(&self, msg: &Message) {
        if msg.arg(0) != Some(self.current_nick().as_str()) {
            return;
        }
        let Some(ctcp) = Ctcp::parse(msg.text()) else {
            return;
        };
        let from = msg.source.nick.as_str();
        if from.is_empty() {
            return;
        }
        debug!(from = %from, query = %ctcp.kind, "ctcp query");
        match ctcp.kind {
            CtcpKind::Version => self.ctcp_reply(
                from,
                "VERSION",
                concat!("slircbot:", env!("CARGO_PKG_VERSION"), ":rust"),
            ),
            CtcpKind::Time => self.ctcp_reply(from, "TIME", &chrono::Utc::now().to_rfc2822()),
            // PING echoes the full query payload back.
            CtcpKind::Ping => self.ctcp_reply_body(from, ctcp.body),
            CtcpKind::Userinfo => self.ctcp_reply(from, "USERINFO", &self.inner.server.username),
            CtcpKind::Clientinfo => {
                self.ctcp_reply(from, "CLIENTINFO", "PING VERSION TIME USERINFO CLIENTINFO")
            }
            _ => {}
        }
    }
}

/// Report an I/O failure on the connection's error channel.
///
/// The channel is small and the supervisor may be busy; later errors
/// from an already-failed link carry no extra information, so a full
/// channel is not waited on.
fn report(errors: &mpsc::Sender<io::Error>, err: io::Error) {
    if let Err(e) = errors.try_send(err) {
        debug!(error = %e, "error channel full; dropping report");
    }
}
