//! Interactive Parley client: a login-then-chat flow where a background
//! task polls for new messages while the main loop reads stdin lines and
//! sends them.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use parley_client::{ClientConnection, ClientHandshakeError};
use parley_core::config::ParleyConfig;
use parley_core::hash::hash_hex;
use parley_services::chat::ChatRequest;
use tokio::sync::Mutex;

fn prompt(label: &str) -> String {
    print!("{label}: ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).expect("reading stdin");
    line.trim_end_matches(['\n', '\r']).to_string()
}

fn print_connect_error(err: &ClientHandshakeError) {
    match err {
        ClientHandshakeError::UnknownUser => println!("unknown user"),
        ClientHandshakeError::IncorrectPassword => println!("incorrect password"),
        ClientHandshakeError::ConnectionRefused => println!("could not connect to server"),
        other => println!("other connection error: {other}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // A positional host overrides the configured default connect address.
    let config = ParleyConfig::load().unwrap_or_default();
    let addr = std::env::args().nth(1).unwrap_or(config.network.connect_addr);

    let username = prompt("username");
    let password = prompt("password");
    let password_hash = hash_hex(password.as_bytes());

    let conn = match ClientConnection::connect(&addr, &username, &password_hash).await {
        Ok(conn) => conn,
        Err(err) => {
            print_connect_error(&err);
            std::process::exit(1);
        }
    };
    println!("connected as {username}");

    let conn = Arc::new(Mutex::new(conn));

    let poller = {
        let conn = conn.clone();
        tokio::spawn(async move {
            let mut seen = 0usize;
            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let mut guard = conn.lock().await;
                if guard.write(&ChatRequest::read_json()).await.is_err() {
                    return;
                }
                let reply = match guard.read().await {
                    Ok(reply) => reply,
                    Err(_) => return,
                };
                drop(guard);

                let messages: Vec<parley_services::chat::Message> =
                    match serde_json::from_str(&reply) {
                        Ok(messages) => messages,
                        Err(_) => continue,
                    };
                for message in messages.iter().skip(seen) {
                    println!("{}: {}", message.author, message.content);
                }
                seen = messages.len();
            }
        })
    };

    let mut input = String::new();
    loop {
        input.clear();
        let n = std::io::stdin().read_line(&mut input).expect("reading stdin");
        if n == 0 {
            break;
        }
        let text = input.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        let mut guard = conn.lock().await;
        if let Err(err) = guard.write(&ChatRequest::write_json(text)).await {
            println!("send failed: {err}");
            break;
        }
        if let Err(err) = guard.read().await {
            println!("send failed: {err}");
            break;
        }
    }

    poller.abort();
    let _ = poller.await;

    match Arc::try_unwrap(conn) {
        Ok(conn) => {
            let _ = conn.into_inner().say_goodbye().await;
        }
        Err(_) => {
            // another handle to the connection is still alive; nothing
            // we can do but let the socket close on drop.
        }
    }
}
