//! Parley integration test harness.
//!
//! These tests spawn the real `parleyd` and `parley-mitm` binaries and talk
//! to them over real loopback TCP sockets, covering the end-to-end
//! handshake, chat, and MITM-splice scenarios. Every test picks its own
//! port (derived from the process id plus an atomic counter) so the suite
//! runs with `cargo test`'s default parallelism instead of serializing all
//! daemon-spawning tests on one fixed port.

use anyhow::{Context, Result};
use parley_core::dh::DiffieParams;
use parley_core::hash::hash_hex;
use parley_services::UserDirectory;
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

mod handshake;
mod mitm;

// ── Binary paths ──────────────────────────────────────────────────────────────

fn target_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).parent().unwrap().parent().unwrap().join("target/debug")
}

fn parleyd_path() -> PathBuf {
    target_dir().join("parleyd")
}

fn parley_mitm_path() -> PathBuf {
    target_dir().join("parley-mitm")
}

fn binaries_available() -> bool {
    parleyd_path().exists()
}

fn mitm_available() -> bool {
    parley_mitm_path().exists()
}

// ── Port allocation ───────────────────────────────────────────────────────────

static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// A port unique to this test process and call site, in the ephemeral range.
fn next_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::Relaxed);
    20000 + (std::process::id() as u16 % 5000) + offset
}

// ── Process helpers ───────────────────────────────────────────────────────────

/// A spawned `parleyd`, killed when dropped.
struct Daemon {
    child: Child,
    pub addr: String,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Seed a fresh SQLite user directory at `db_path` with one user, then spawn
/// `parleyd` bound to a fresh port with that directory.
fn spawn_daemon_with_user(db_path: &std::path::Path, username: &str, password: &str) -> Result<Daemon> {
    let params = DiffieParams::generate(24, 16, parley_core::dh::DEFAULT_MILLER_RABIN_ROUNDS);
    let dir = UserDirectory::open(db_path, params).context("seeding user directory")?;
    dir.add_user(username, &hash_hex(password.as_bytes()), false).context("adding test user")?;
    drop(dir);
    spawn_daemon(db_path)
}

/// Spawn `parleyd` against an already-prepared (possibly empty) directory.
fn spawn_daemon(db_path: &std::path::Path) -> Result<Daemon> {
    let port = next_port();
    let addr = format!("127.0.0.1:{port}");

    let child = Command::new(parleyd_path())
        .arg("--bind")
        .arg(&addr)
        .env("PARLEY_STORAGE__USERS_DB_PATH", db_path)
        .env("RUST_LOG", "warn")
        .spawn()
        .context("spawning parleyd")?;

    wait_for_port(&addr, 40).context("waiting for parleyd to start listening")?;
    Ok(Daemon { child, addr })
}

/// Spawn `parley-mitm` fronting `upstream`, returning the proxy's own
/// listen address.
fn spawn_mitm(upstream: &str) -> Result<Daemon> {
    let port = next_port();
    let addr = format!("127.0.0.1:{port}");

    let child = Command::new(parley_mitm_path())
        .arg(upstream)
        .arg("--bind")
        .arg(&addr)
        .env("RUST_LOG", "warn")
        .spawn()
        .context("spawning parley-mitm")?;

    wait_for_port(&addr, 40).context("waiting for parley-mitm to start listening")?;
    Ok(Daemon { child, addr })
}

fn wait_for_port(addr: &str, max_attempts: u32) -> Result<()> {
    for _ in 0..max_attempts {
        if TcpStream::connect(addr).is_ok() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(50));
    }
    anyhow::bail!("nothing ever listened on {addr}");
}

fn temp_db_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("parley-test-{label}-{}-{}.sqlite", std::process::id(), next_port()))
}
