//! parleyd — the Parley chat server.
//!
//! Generates the process-global Diffie–Hellman parameters once, before the
//! listener binds, opens the SQLite user directory, and then
//! accepts connections, handing each to its own task.

mod connection;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parley_core::config::ParleyConfig;
use parley_core::dh::DiffieParams;
use parley_services::{ChatLog, UserDirectory};
use tokio::net::TcpListener;

fn parse_args() -> (Option<String>, Option<PathBuf>) {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut bind = None;
    let mut config_path = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                i += 1;
                bind = args.get(i).cloned();
            }
            "--config" => {
                i += 1;
                config_path = args.get(i).map(PathBuf::from);
            }
            other => {
                eprintln!("unknown argument: {other}");
            }
        }
        i += 1;
    }
    (bind, config_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (bind, config_path) = parse_args();
    if let Some(path) = config_path {
        unsafe {
            std::env::set_var("PARLEY_CONFIG", path);
        }
    }
    let mut config = ParleyConfig::load().context("loading configuration")?;
    if let Some(bind) = bind {
        config.network.bind_addr = bind;
    }

    tracing::info!("generating diffie-hellman parameters ({} bits)", config.crypto.dh_bits);
    let diffie_params = DiffieParams::generate(
        config.crypto.dh_bits,
        config.crypto.dh_root_search_bits,
        config.crypto.miller_rabin_rounds,
    );
    tracing::info!("diffie-hellman parameters ready");

    let world = Arc::new(
        UserDirectory::open(&config.storage.users_db_path, diffie_params)
            .context("opening user directory")?,
    );
    let chat = ChatLog::new();

    let listener = TcpListener::bind(&config.network.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.network.bind_addr))?;
    tracing::info!(addr = %config.network.bind_addr, "serving");

    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let world = world.clone();
        let chat = chat.clone();
        tokio::spawn(async move {
            if let Err(e) = connection::handle_connection(stream, &world, &chat, peer).await {
                tracing::warn!(%peer, error = %e, "connection ended with an error");
            }
        });
    }
}
