//! The external hasher: UTF-8 bytes in, lowercase hex digest out.
//!
//! Used both to seed the user directory's stored password hashes and
//! inside the handshake's challenge-response step (`solve_task`).

use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 digest of `data`.
pub fn hash_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// `solve_task(password_hash, nonce) = H(password_hash || nonce)`.
///
/// `password_hash` and `nonce` are both already hex strings; they are
/// concatenated as UTF-8 bytes (not decoded), matching the source's
/// `hash_hasher(password_hash + nonce)`.
pub fn solve_task(password_hash: &str, nonce: &str) -> String {
    let mut combined = String::with_capacity(password_hash.len() + nonce.len());
    combined.push_str(password_hash);
    combined.push_str(nonce);
    hash_hex(combined.as_bytes())
}
