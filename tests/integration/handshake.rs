//! End-to-end handshake and chat scenarios (happy path, unknown user,
//! wrong password, clean goodbye) against a real `parleyd` over a real TCP
//! socket.

use crate::*;
use parley_client::{ClientConnection, ClientHandshakeError};
use parley_services::chat::{ChatRequest, Message};

/// Scenario 1: happy path. Handshake completes, a write is acknowledged,
/// and a subsequent read returns the message just written.
#[tokio::test]
async fn happy_path_write_then_read() {
    if !binaries_available() {
        eprintln!("SKIP: parleyd binary not built");
        return;
    }
    let db = temp_db_path("happy");
    let daemon = spawn_daemon_with_user(&db, "alice", "hunter2").expect("spawn parleyd");

    let password_hash = parley_core::hash::hash_hex(b"hunter2");
    let mut conn = ClientConnection::connect(&daemon.addr, "alice", &password_hash)
        .await
        .expect("handshake should succeed");

    conn.write(&ChatRequest::write_json("hello")).await.expect("write");
    let ack = conn.read().await.expect("read ack");
    assert_eq!(ack, "\"ack\"");

    conn.write(&ChatRequest::read_json()).await.expect("write read-request");
    let reply = conn.read().await.expect("read message list");
    let messages: Vec<Message> = serde_json::from_str(&reply).expect("message list is JSON");
    assert_eq!(messages, vec![Message { author: "alice".into(), content: "hello".into() }]);

    conn.say_goodbye().await.expect("goodbye");
}

/// Scenario 2: an unknown username never gets a `Nonce`, only a classified
/// `UnknownUser` error.
#[tokio::test]
async fn unknown_user_is_rejected() {
    if !binaries_available() {
        eprintln!("SKIP: parleyd binary not built");
        return;
    }
    let db = temp_db_path("unknown-user");
    let daemon = spawn_daemon(&db).expect("spawn parleyd");

    let err = ClientConnection::connect(&daemon.addr, "bob", &parley_core::hash::hash_hex(b"whatever"))
        .await
        .expect_err("bob is not registered");
    assert!(matches!(err, ClientHandshakeError::UnknownUser));
}

/// Scenario 3: a correct username with the wrong password is classified as
/// `IncorrectPassword`, not a generic error.
#[tokio::test]
async fn wrong_password_is_rejected() {
    if !binaries_available() {
        eprintln!("SKIP: parleyd binary not built");
        return;
    }
    let db = temp_db_path("wrong-pw");
    let daemon = spawn_daemon_with_user(&db, "alice", "pw1").expect("spawn parleyd");

    let err = ClientConnection::connect(&daemon.addr, "alice", &parley_core::hash::hash_hex(b"pw2"))
        .await
        .expect_err("pw2 does not match the stored hash of pw1");
    assert!(matches!(err, ClientHandshakeError::IncorrectPassword));
}

/// Empty credentials are rejected locally, before any bytes reach the wire
/// — no daemon needed for this one.
#[tokio::test]
async fn empty_username_is_rejected_before_connecting() {
    let err = ClientConnection::connect("127.0.0.1:1", "", "deadbeef").await.expect_err("empty username");
    assert!(matches!(err, ClientHandshakeError::Protocol(_)));
}

/// Scenario 6: after `DiffieDone`, `ClientGoodbye` closes the transport
/// cleanly and the server emits no further frame.
#[tokio::test]
async fn goodbye_closes_cleanly() {
    if !binaries_available() {
        eprintln!("SKIP: parleyd binary not built");
        return;
    }
    let db = temp_db_path("goodbye");
    let daemon = spawn_daemon_with_user(&db, "alice", "hunter2").expect("spawn parleyd");

    let password_hash = parley_core::hash::hash_hex(b"hunter2");
    let conn = ClientConnection::connect(&daemon.addr, "alice", &password_hash)
        .await
        .expect("handshake should succeed");

    // say_goodbye consumes the connection; a clean return means the server
    // didn't send an error frame in response to ClientGoodbye.
    conn.say_goodbye().await.expect("goodbye should close without error");
}
