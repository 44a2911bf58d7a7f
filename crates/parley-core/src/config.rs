//! Configuration for Parley.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PARLEY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/parley/config.toml
//!   3. ~/.config/parley/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration shared by `parleyd` and `parley-client`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub network: NetworkConfig,
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address `parleyd` binds to.
    pub bind_addr: String,
    /// Address `parley-client`/`parley-mitm` connect to by default.
    pub connect_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Bit-length of the DH prime.
    pub dh_bits: u64,
    /// Bit-length primitive-root candidates are drawn from.
    pub dh_root_search_bits: u64,
    /// Miller–Rabin witness rounds for primality testing.
    pub miller_rabin_rounds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite user directory.
    pub users_db_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            crypto: CryptoConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4433".to_string(),
            connect_addr: "127.0.0.1:4433".to_string(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { dh_bits: 64, dh_root_search_bits: 32, miller_rabin_rounds: 40 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { users_db_path: PathBuf::from("users.sqlite") }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("parley")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ParleyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ParleyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PARLEY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text =
                toml::to_string_pretty(&ParleyConfig::default()).map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply `PARLEY_*` env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PARLEY_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Ok(v) = std::env::var("PARLEY_NETWORK__CONNECT_ADDR") {
            self.network.connect_addr = v;
        }
        if let Ok(v) = std::env::var("PARLEY_CRYPTO__DH_BITS") {
            if let Ok(n) = v.parse() {
                self.crypto.dh_bits = n;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_CRYPTO__DH_ROOT_SEARCH_BITS") {
            if let Ok(n) = v.parse() {
                self.crypto.dh_root_search_bits = n;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_STORAGE__USERS_DB_PATH") {
            self.storage.users_db_path = PathBuf::from(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_network_and_crypto() {
        let config = ParleyConfig::default();
        assert_eq!(config.network.bind_addr, "127.0.0.1:4433");
        assert_eq!(config.crypto.dh_bits, 64);
        assert_eq!(config.crypto.dh_root_search_bits, 32);
    }

    #[test]
    fn write_default_if_missing_creates_a_loadable_file() {
        let tmp = std::env::temp_dir().join(format!("parley-config-test-{}", std::process::id()));
        let config_path = tmp.join("config.toml");
        std::fs::create_dir_all(&tmp).unwrap();

        unsafe {
            std::env::set_var("PARLEY_CONFIG", config_path.to_str().unwrap());
        }

        let path = ParleyConfig::write_default_if_missing().expect("write_default_if_missing failed");
        assert!(path.exists());

        let config = ParleyConfig::load().expect("load should succeed");
        assert_eq!(config.crypto.dh_bits, 64);

        unsafe {
            std::env::remove_var("PARLEY_CONFIG");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
