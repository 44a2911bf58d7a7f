//! parley-client — the client-side connection driver.

use parley_core::wire::{b64_decode, b64_encode, ERR_UNKNOWN_USER, ERR_WRONG_HASH};
use parley_core::{ClientIdentity, ClientMessage, ClientState, Rc4, ServerMessage};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// The three user-visible failure classes the client can surface. The substring
/// match against `ServerError.text` is part of the wire contract and must
/// stay in sync with `parley_core::wire::{ERR_UNKNOWN_USER, ERR_WRONG_HASH}`.
#[derive(Debug, Error)]
pub enum ClientHandshakeError {
    #[error("unknown user")]
    UnknownUser,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("could not connect to server")]
    ConnectionRefused,
    #[error("other connection error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn classify(message: &str) -> ClientHandshakeError {
    if message.contains(ERR_WRONG_HASH) {
        ClientHandshakeError::IncorrectPassword
    } else if message.contains(ERR_UNKNOWN_USER) {
        ClientHandshakeError::UnknownUser
    } else {
        ClientHandshakeError::Protocol(message.to_string())
    }
}

/// A live, handshaken connection to the server. Only reachable via
/// [`ClientConnection::connect`], which fails unless the full handshake
/// (through the driver's own `DiffieOk` read) succeeds.
pub struct ClientConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    rc4: Rc4,
    pub username: String,
    pub session_key: num_bigint::BigUint,
}

impl ClientConnection {
    /// Reject empty credentials before any bytes are sent,
    /// connect, and run the handshake to completion.
    pub async fn connect(
        addr: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<Self, ClientHandshakeError> {
        if username.is_empty() {
            return Err(ClientHandshakeError::Protocol("username cannot be empty".to_string()));
        }
        if password_hash.is_empty() {
            return Err(ClientHandshakeError::Protocol("password cannot be empty".to_string()));
        }

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|_| ClientHandshakeError::ConnectionRefused)?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;

        let identity = ClientIdentity { username: username.to_string(), password_hash: password_hash.to_string() };

        let (first, mut state) = ClientState::on_init(&identity);
        write_frame(&mut writer, &first.encode()).await?;

        let (key, rc4) = loop {
            let server_message = read_server_frame(&mut reader).await?;
            let (outgoing, next) = state.on_message(server_message, &identity);
            write_frame(&mut writer, &outgoing.encode()).await?;
            state = next;

            match state {
                ClientState::ErrorState { message } => return Err(classify(&message)),
                ClientState::DiffieDone { key, rc4 } => break (key, rc4),
                _ => continue,
            }
        };

        // The driver reads one more frame here and requires DiffieOk,
        // ignoring its payload — this is a driver-level read, not a
        // state machine transition.
        match read_server_frame(&mut reader).await? {
            ServerMessage::DiffieOk => {}
            other => {
                return Err(ClientHandshakeError::Protocol(format!(
                    "expected DiffieOk after key exchange, got {other:?}"
                )))
            }
        }

        Ok(ClientConnection { reader, writer, rc4, username: username.to_string(), session_key: key })
    }

    /// Encrypt `text` and send it as `ClientData`.
    pub async fn write(&mut self, text: &str) -> Result<(), ClientHandshakeError> {
        let cryptogram = b64_encode(&self.rc4.apply(text.as_bytes()));
        write_frame(&mut self.writer, &ClientMessage::ClientData { data: cryptogram }.encode()).await?;
        Ok(())
    }

    /// Read and decrypt one `ServerCryptogramm` reply.
    pub async fn read(&mut self) -> Result<String, ClientHandshakeError> {
        match read_server_frame(&mut self.reader).await? {
            ServerMessage::ServerCryptogramm { content } => {
                let raw = b64_decode(&content)
                    .map_err(|e| ClientHandshakeError::Protocol(format!("bad base64: {e}")))?;
                let plain = self.rc4.apply(&raw);
                String::from_utf8(plain)
                    .map_err(|_| ClientHandshakeError::Protocol("reply was not valid UTF-8".to_string()))
            }
            other => Err(ClientHandshakeError::Protocol(format!("expected ServerCryptogramm, got {other:?}"))),
        }
    }

    /// Send `ClientGoodbye` and close the transport.
    pub async fn say_goodbye(mut self) -> Result<(), ClientHandshakeError> {
        write_frame(&mut self.writer, &ClientMessage::ClientGoodbye.encode()).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn read_server_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<ServerMessage, ClientHandshakeError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ClientHandshakeError::Protocol("server closed the connection".to_string()));
    }
    ServerMessage::decode(line.trim_end())
        .map_err(|e| ClientHandshakeError::Protocol(format!("malformed frame: {e}")))
}
