//! The user directory — the external collaborator the server state machine
//! consults for `has_user` / `get_user_password_hash` / `get_diffie_params`.
//! Backed by SQLite.

use std::sync::Mutex;

use num_bigint::BigUint;
use parley_core::dh::DiffieParams;
use parley_core::World;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UserDirectoryError {
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// SQLite-backed user directory plus the process-global Diffie–Hellman
/// parameters. `(g, p)` are generated once at server startup and
/// handed to every lookup regardless of username.
pub struct UserDirectory {
    conn: Mutex<Connection>,
    diffie_params: DiffieParams,
}

impl UserDirectory {
    /// Open (creating if absent) the SQLite database at `path` and ensure
    /// the `users` table exists.
    pub fn open(path: &std::path::Path, diffie_params: DiffieParams) -> Result<Self, UserDirectoryError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users(
                name VARCHAR(60) PRIMARY KEY,
                password_hash VARCHAR(60) NOT NULL
            ) WITHOUT ROWID",
            (),
        )?;
        Ok(Self { conn: Mutex::new(conn), diffie_params })
    }

    /// An in-memory directory, for tests.
    pub fn open_in_memory(diffie_params: DiffieParams) -> Result<Self, UserDirectoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users(
                name VARCHAR(60) PRIMARY KEY,
                password_hash VARCHAR(60) NOT NULL
            ) WITHOUT ROWID",
            (),
        )?;
        Ok(Self { conn: Mutex::new(conn), diffie_params })
    }

    pub fn diffie_params(&self) -> &DiffieParams {
        &self.diffie_params
    }

    pub fn find_user(&self, username: &str) -> Result<Option<UserRecord>, UserDirectoryError> {
        let conn = self.conn.lock().expect("user directory mutex poisoned");
        let record = conn
            .query_row(
                "SELECT name, password_hash FROM users WHERE name = ?1",
                [username],
                |row| Ok(UserRecord { username: row.get(0)?, password_hash: row.get(1)? }),
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>, UserDirectoryError> {
        let conn = self.conn.lock().expect("user directory mutex poisoned");
        let mut stmt = conn.prepare("SELECT name, password_hash FROM users")?;
        let rows = stmt
            .query_map((), |row| Ok(UserRecord { username: row.get(0)?, password_hash: row.get(1)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Add a new user. Rejects a duplicate username unless `force` is set,
    /// in which case the existing row is overwritten (the CLI's `--force`
    /// flag).
    pub fn add_user(&self, username: &str, password_hash: &str, force: bool) -> Result<(), UserDirectoryError> {
        let conn = self.conn.lock().expect("user directory mutex poisoned");
        if force {
            conn.execute(
                "INSERT INTO users(name, password_hash) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET password_hash = excluded.password_hash",
                (username, password_hash),
            )?;
            return Ok(());
        }
        match conn.execute("INSERT INTO users(name, password_hash) VALUES (?1, ?2)", (username, password_hash)) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(UserDirectoryError::UserExists(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_user(&self, username: &str) -> Result<(), UserDirectoryError> {
        let conn = self.conn.lock().expect("user directory mutex poisoned");
        conn.execute("DELETE FROM users WHERE name = ?1", [username])?;
        Ok(())
    }
}

impl World for UserDirectory {
    fn has_user(&self, username: &str) -> bool {
        self.find_user(username).ok().flatten().is_some()
    }

    fn get_user_password_hash(&self, username: &str) -> String {
        self.find_user(username)
            .ok()
            .flatten()
            .map(|u| u.password_hash)
            .unwrap_or_default()
    }

    fn get_diffie_params(&self, _username: &str) -> (BigUint, BigUint) {
        (self.diffie_params.g.clone(), self.diffie_params.p.clone())
    }
}
