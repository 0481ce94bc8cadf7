//! Handler dispatch tests against an in-process mock server.

mod common;

use std::sync::Arc;

use regex::Regex;

use slirc_bot::connection::Connection;
use slirc_bot::dispatch::{DispatchError, Handlers, MaskPermission};

use common::{MockServer, MockSession};

async fn connected(server: &MockServer) -> (Connection, MockSession) {
    let conn = Connection::new(server.server_config("grain"), server.timing());
    conn.connect().await.unwrap();
    let mut session = server.accept().await;
    session.welcome("grain").await;
    (conn, session)
}

#[tokio::test]
async fn test_command_handler_triggers() {
    let server = MockServer::bind().await;
    let (conn, mut session) = connected(&server).await;
    let handlers = Handlers::new(conn.clone());

    handlers
        .add_command("echo", None, |cmd, conn| {
            let channel = cmd.channel(&conn.current_nick()).unwrap_or("#nowhere");
            conn.privmsg(channel, cmd.text);
            Ok(())
        })
        .unwrap();

    session
        .send_line(":alice!a@host PRIVMSG #chan :.echo hello world")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :hello world");

    // Near-miss command words do not trigger.
    session
        .send_line(":alice!a@host PRIVMSG #chan :.echoes nothing")
        .await;
    session.send_line("PING :sentinel").await;
    assert_eq!(session.expect("PONG").await, "PONG :sentinel");

    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_permission_rejection_notifies_sender() {
    let server = MockServer::bind().await;
    let (conn, mut session) = connected(&server).await;
    let handlers = Handlers::new(conn.clone());

    let admins = MaskPermission::new(Regex::new(r"^admin!.*@trusted\.example$").unwrap());
    handlers
        .add_command("op", Some(Arc::new(admins)), |_, conn| {
            conn.privmsg("#chan", "opped");
            Ok(())
        })
        .unwrap();

    // Ambient chatter from an unprivileged sender draws no denial.
    session
        .send_line(":mallory!m@evil.example PRIVMSG #chan :good morning everyone")
        .await;
    session.send_line("PING :quiet").await;
    assert_eq!(session.expect("PONG").await, "PONG :quiet");

    // Actually invoking the gated command does.
    session
        .send_line(":mallory!m@evil.example PRIVMSG #chan :.op mallory")
        .await;
    assert_eq!(
        session.read_line().await,
        "NOTICE mallory :You don't have permission to do that."
    );

    session
        .send_line(":admin!a@trusted.example PRIVMSG #chan :.op admin")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :opped");

    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let server = MockServer::bind().await;
    let (conn, mut session) = connected(&server).await;
    let handlers = Handlers::new(conn.clone());

    handlers
        .add_command("boom", None, |_, _| panic!("kaboom"))
        .unwrap();
    handlers
        .add_command("echo", None, |cmd, conn| {
            conn.privmsg("#chan", cmd.text);
            Ok(())
        })
        .unwrap();

    session
        .send_line(":alice!a@host PRIVMSG #chan :.boom")
        .await;
    session
        .send_line(":alice!a@host PRIVMSG #chan :.echo survived")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :survived");

    // The panicking handler keeps serving later messages too.
    session
        .send_line(":alice!a@host PRIVMSG #chan :.boom")
        .await;
    session
        .send_line(":alice!a@host PRIVMSG #chan :.echo twice")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :twice");

    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_response_handler_on_mention() {
    let server = MockServer::bind().await;
    let (conn, mut session) = connected(&server).await;
    let handlers = Handlers::new(conn.clone());

    handlers
        .add_response(
            "greet",
            Regex::new(r"^hello\b").unwrap(),
            None,
            |resp, conn| {
                conn.privmsg("#chan", &format!("hi {}", resp.message.source.nick));
                Ok(())
            },
        )
        .unwrap();

    // Unaddressed channel chatter is ignored.
    session
        .send_line(":alice!a@host PRIVMSG #chan :hello everyone")
        .await;
    // Addressed to us, it triggers.
    session
        .send_line(":alice!a@host PRIVMSG #chan :grain: hello there")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :hi alice");

    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_removed_handler_stops_firing() {
    let server = MockServer::bind().await;
    let (conn, mut session) = connected(&server).await;
    let handlers = Handlers::new(conn.clone());

    handlers
        .add_command("echo", None, |cmd, conn| {
            conn.privmsg("#chan", cmd.text);
            Ok(())
        })
        .unwrap();

    session
        .send_line(":alice!a@host PRIVMSG #chan :.echo before")
        .await;
    assert_eq!(session.read_line().await, "PRIVMSG #chan :before");

    handlers.remove("echo").unwrap();
    assert!(handlers.is_empty());

    session
        .send_line(":alice!a@host PRIVMSG #chan :.echo after")
        .await;
    session.send_line("PING :sentinel").await;
    assert_eq!(session.expect("PONG").await, "PONG :sentinel");

    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_registry_name_errors() {
    let server = MockServer::bind().await;
    let conn = Connection::new(server.server_config("grain"), server.timing());
    let handlers = Handlers::new(conn.clone());

    handlers.add_command("echo", None, |_, _| Ok(())).unwrap();
    assert!(matches!(
        handlers.add_command("echo", None, |_, _| Ok(())),
        Err(DispatchError::DuplicateName(_))
    ));
    assert!(matches!(
        handlers.remove("nope"),
        Err(DispatchError::UnknownName(_))
    ));

    handlers.clear();
    assert!(handlers.is_empty());
}
