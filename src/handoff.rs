//! Zero-downtime process handoff.
//!
//! On SIGUSR2 the running process duplicates its live socket
//! descriptor, clears close-on-exec on the duplicate, records it in
//! the environment, and spawns its own binary again. The successor
//! finds the descriptor in its environment, adopts the socket without
//! reconnecting, and signals the parent to exit. The server never sees
//! the connection drop.
//!
//! The environment contract:
//!
//! - `RESTART_FD`: descriptor number of the inherited socket
//! - `RESTART_NAME`: descriptive peer name, for logging only
//! - `RESTART_PID`: pid of the parent to signal; empty when the parent
//!   could not record it before exec
//! - `RESTART_PPID`: pid of the process that performed the export,
//!   used as a fallback when `RESTART_PID` is empty

use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::process::Command;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info};

use crate::error::HandoffError;

/// Descriptor number of the inherited socket.
pub const ENV_FD: &str = "RESTART_FD";
/// Descriptive name of the inherited socket.
pub const ENV_NAME: &str = "RESTART_NAME";
/// Pid of the parent process to signal once adopted.
pub const ENV_PID: &str = "RESTART_PID";
/// Pid of the exporting process, fallback for [`ENV_PID`].
pub const ENV_PPID: &str = "RESTART_PPID";

// Mutating the environment is unsynchronized with any concurrent
// getenv. All handoff env writes happen on the supervisor path while
// no other thread reads the environment.
fn set_env(name: &str, value: &str) {
    #[allow(unsafe_code)]
    // SAFETY: see module note above; single-threaded supervisor path.
    unsafe {
        std::env::set_var(name, value)
    };
}

fn remove_env(name: &str) {
    #[allow(unsafe_code)]
    // SAFETY: see module note above; single-threaded supervisor path.
    unsafe {
        std::env::remove_var(name)
    };
}

/// Duplicate `fd` into a descriptor that survives exec.
///
/// The duplicate has close-on-exec cleared so a spawned child inherits
/// it; the original is left untouched.
fn export_descriptor(fd: RawFd) -> Result<OwnedFd, HandoffError> {
    // SAFETY: `fd` is the live socket owned by the connection's stream
    // halves, which outlive this borrow; we only duplicate it.
    #[allow(unsafe_code)]
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let dup = borrowed.try_clone_to_owned().map_err(HandoffError::Export)?;

    let socket = socket2::Socket::from(dup);
    socket.set_cloexec(false).map_err(HandoffError::Export)?;
    Ok(socket.into())
}

/// Export the live socket into the environment for a successor.
///
/// Returns the duplicated descriptor; the caller must keep it alive
/// until the successor has been spawned, since the connection's own
/// descriptors close when its loops shut down.
pub fn prepare_handoff(fd: RawFd, peer: &str) -> Result<OwnedFd, HandoffError> {
    let dup = export_descriptor(fd)?;

    set_env(ENV_FD, &dup.as_raw_fd().to_string());
    set_env(ENV_NAME, &format!("tcp:{peer}->"));
    // The successor's pid is not known yet; recorded by spawn_successor.
    set_env(ENV_PID, "");
    set_env(ENV_PPID, &std::process::id().to_string());

    info!(fd = dup.as_raw_fd(), peer, "socket exported for handoff");
    Ok(dup)
}

/// Spawn a fresh copy of this binary as the successor process.
///
/// The child inherits the environment written by [`prepare_handoff`]
/// and every descriptor with close-on-exec cleared. Returns the
/// child's pid.
pub fn spawn_successor() -> Result<u32, HandoffError> {
    let exe = std::env::current_exe().map_err(HandoffError::Spawn)?;
    let mut command = Command::new(&exe);
    command.args(std::env::args_os().skip(1));
    if let Ok(dir) = std::env::current_dir() {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(HandoffError::Spawn)?;
    let pid = child.id();
    set_env(ENV_PID, &pid.to_string());

    info!(pid, exe = %exe.display(), "successor spawned");
    Ok(pid)
}

/// Adopt a socket inherited from a predecessor, if one was exported.
///
/// Returns `Ok(None)` when the environment carries no handoff state,
/// i.e. on a normal cold start. The returned stream is in blocking
/// mode; callers converting it for async use must clear that first.
pub fn inherited_socket() -> Result<Option<std::net::TcpStream>, HandoffError> {
    let Ok(value) = std::env::var(ENV_FD) else {
        return Ok(None);
    };
    let fd: RawFd = value.parse().map_err(|_| HandoffError::BadEnv {
        name: ENV_FD,
        value: value.clone(),
    })?;

    // SAFETY: the predecessor exported this descriptor for us and holds
    // no further claim on it once we exec'd; we take sole ownership.
    #[allow(unsafe_code)]
    let stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };

    // A stale or recycled descriptor will not answer for a peer.
    let peer = stream
        .peer_addr()
        .map_err(|source| HandoffError::BadFd { fd, source })?;

    let name = std::env::var(ENV_NAME).unwrap_or_default();
    info!(fd, peer = %peer, name = %name, "adopted inherited socket");
    Ok(Some(stream))
}

/// Signal the predecessor that its socket has been adopted.
///
/// Prefers [`ENV_PID`]; falls back to [`ENV_PPID`] when the
/// predecessor exec'd before it could record the child pid.
pub fn signal_parent() -> Result<(), HandoffError> {
    let pid = match std::env::var(ENV_PID) {
        Ok(value) if !value.is_empty() => parse_pid(ENV_PID, &value)?,
        _ => {
            let value = std::env::var(ENV_PPID).map_err(|_| HandoffError::MissingEnv(ENV_PPID))?;
            parse_pid(ENV_PPID, &value)?
        }
    };

    debug!(pid, "signalling predecessor");
    // SAFETY: plain kill(2) with a validated pid; no memory concerns.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, libc::SIGQUIT) };
    if rc != 0 {
        return Err(HandoffError::Signal(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn parse_pid(name: &'static str, value: &str) -> Result<libc::pid_t, HandoffError> {
    value.parse().map_err(|_| HandoffError::BadEnv {
        name,
        value: value.to_owned(),
    })
}

/// Remove handoff state from the environment.
///
/// Called once the inherited socket is adopted, so our own future
/// successors do not misread a stale descriptor number.
pub fn clear_restart_env() {
    for name in [ENV_FD, ENV_NAME, ENV_PID, ENV_PPID] {
        remove_env(name);
    }
}

/// Lifecycle decision delivered by [`Signals::recv`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Terminate cleanly.
    Quit,
    /// Hand the socket to a successor process.
    Restart,
}

/// Unix signal streams driving the process lifecycle.
///
/// SIGINT, SIGTERM and SIGQUIT request termination; SIGUSR2 requests
/// a handoff restart. SIGQUIT doubles as the "adopted" acknowledgement
/// a successor sends its predecessor.
pub struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    user2: tokio::signal::unix::Signal,
}

impl Signals {
    /// Install the signal handlers.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            user2: signal(SignalKind::user_defined2())?,
        })
    }

    /// Wait for the next lifecycle signal.
    pub async fn recv(&mut self) -> Lifecycle {
        tokio::select! {
            _ = self.interrupt.recv() => Lifecycle::Quit,
            _ = self.terminate.recv() => Lifecycle::Quit,
            _ = self.quit.recv() => Lifecycle::Quit,
            _ = self.user2.recv() => Lifecycle::Restart,
        }
    }
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signals")
    }
}
