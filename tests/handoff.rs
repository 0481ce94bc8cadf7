//! Handoff environment round-trip test.
//!
//! Kept in its own integration binary: these steps mutate process-wide
//! environment variables, so they run as one sequential test in a
//! process nothing else shares.

use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, IntoRawFd};

use slirc_bot::error::HandoffError;
use slirc_bot::handoff;

#[test]
fn test_export_and_adopt_round_trip() {
    // Cold start: no handoff state in the environment.
    assert!(handoff::inherited_socket().unwrap().is_none());

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (_server_side, _) = listener.accept().unwrap();
    let expected_peer = client.peer_addr().unwrap();

    // Export duplicates the descriptor and records it in the env.
    let keep = handoff::prepare_handoff(client.as_raw_fd(), &expected_peer.to_string()).unwrap();
    assert_ne!(keep.as_raw_fd(), client.as_raw_fd());
    assert_eq!(
        std::env::var(handoff::ENV_FD).unwrap(),
        keep.as_raw_fd().to_string()
    );
    assert_eq!(std::env::var(handoff::ENV_PID).unwrap(), "");
    assert_eq!(
        std::env::var(handoff::ENV_PPID).unwrap(),
        std::process::id().to_string()
    );

    // Adoption finds the duplicate and it answers for the same peer,
    // even though the original descriptor has since been closed.
    drop(client);
    let adopted = handoff::inherited_socket().unwrap().unwrap();
    assert_eq!(adopted.peer_addr().unwrap(), expected_peer);

    // `adopted` and `keep` refer to the same descriptor; forget one
    // side so it is closed exactly once.
    assert_eq!(adopted.as_raw_fd(), keep.as_raw_fd());
    let _ = adopted.into_raw_fd();
    drop(keep);

    // A non-numeric descriptor is rejected without touching it.
    set_env(handoff::ENV_FD, "not-a-number");
    assert!(matches!(
        handoff::inherited_socket(),
        Err(HandoffError::BadEnv { .. })
    ));

    // A descriptor that is not a connected socket is rejected.
    let file = std::fs::File::open("/dev/null").unwrap();
    // Hand ownership to the adoption path; it closes the fd on failure.
    let file_fd = file.into_raw_fd();
    set_env(handoff::ENV_FD, &file_fd.to_string());
    assert!(matches!(
        handoff::inherited_socket(),
        Err(HandoffError::BadFd { .. })
    ));

    // Clearing removes all handoff state.
    handoff::clear_restart_env();
    assert!(handoff::inherited_socket().unwrap().is_none());
    assert!(std::env::var(handoff::ENV_NAME).is_err());
}

#[allow(unsafe_code)]
fn set_env(name: &str, value: &str) {
    // Single-threaded test binary; no concurrent env readers.
    unsafe { std::env::set_var(name, value) };
}
