//! The server-side connection driver: frames the wire protocol over
//! a TCP stream, wires each frame through `ServerState::on_message`, and —
//! once `DiffieDone` — runs the application loop between the encrypted
//! channel and the chat service.

use anyhow::{bail, Context, Result};
use parley_core::wire::{b64_decode, b64_encode, ClientMessage, ServerMessage};
use parley_core::ServerState;
use parley_services::chat::ChatRequest;
use parley_services::{ChatLog, UserDirectory};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Drive one client connection end to end: handshake, then the application
/// loop, until the peer says goodbye or a protocol error closes things.
pub async fn handle_connection(
    stream: TcpStream,
    world: &UserDirectory,
    chat: &ChatLog,
    peer: std::net::SocketAddr,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let mut state = ServerState::Start;
    let username = loop {
        line.clear();
        let n = reader.read_line(&mut line).await.context("reading handshake frame")?;
        if n == 0 {
            bail!("peer {peer} disconnected mid-handshake");
        }
        let message = match ClientMessage::decode(line.trim_end()) {
            Ok(m) => m,
            Err(e) => bail!("peer {peer} sent an unparseable frame: {e}"),
        };

        let (reply, next) = state.on_message(message, world);
        write_frame(&mut write_half, &reply.encode()).await?;
        state = next;

        match &state {
            ServerState::ErrorState { message } => {
                tracing::warn!(%peer, %message, "handshake failed");
                return Ok(());
            }
            ServerState::DiffieDone { username, shared_key, .. } => {
                tracing::info!(%peer, %username, %shared_key, "handshake complete");
                break username.clone();
            }
            _ => continue,
        }
    };

    let mut rc4 = match state {
        ServerState::DiffieDone { rc4, .. } => rc4,
        _ => unreachable!("loop only exits once DiffieDone"),
    };

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await.context("reading application frame")?;
        if n == 0 {
            tracing::info!(%peer, %username, "connection dropped without goodbye");
            return Ok(());
        }
        let message = match ClientMessage::decode(line.trim_end()) {
            Ok(m) => m,
            Err(e) => bail!("peer {peer} sent an unparseable frame: {e}"),
        };

        match message {
            ClientMessage::ClientGoodbye => {
                tracing::info!(%peer, %username, "closed connection");
                return Ok(());
            }
            ClientMessage::ClientData { data } => {
                let raw = b64_decode(&data).context("decoding ClientData payload")?;
                let plaintext = rc4.apply(&raw);
                let text = String::from_utf8(plaintext).context("ClientData payload is not UTF-8")?;

                let reply = match ChatRequest::parse(&text) {
                    Some(ChatRequest::Write { content }) => {
                        chat.append(&username, &content).await;
                        tracing::debug!(%username, %content, "wrote message");
                        serde_json::to_string("ack").expect("string always serializes")
                    }
                    Some(ChatRequest::Read) => {
                        let snapshot = chat.snapshot().await;
                        serde_json::to_string(&snapshot).expect("message list always serializes")
                    }
                    None => {
                        tracing::warn!(%peer, %username, %text, "got unknown inner request");
                        return Ok(());
                    }
                };

                let cryptogram = b64_encode(&rc4.apply(reply.as_bytes()));
                write_frame(&mut write_half, &ServerMessage::ServerCryptogramm { content: cryptogram }.encode())
                    .await?;
            }
            unexpected => {
                bail!("peer {peer} sent unexpected message after handshake: {unexpected:?}");
            }
        }
    }
}

async fn write_frame(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
