//! RC4-derived keystream generator.
//!
//! This is not textbook RC4. Two deviations are load-bearing for wire
//! interop and must not be "fixed":
//!
//!   * the key-schedule byte count is `ceil(popcount(k) / 8)`, the number
//!     of set bits in the key divided by eight, not the key's byte length;
//!   * the key-schedule loop runs over `i in 0..255` — 255 iterations, not
//!     256 — so `S[255]` can come out of the schedule unswapped.
//!
//! `k` is always serialized to exactly 256 little-endian bytes before the
//! schedule runs.

use num_bigint::BigUint;

const STATE_LEN: usize = 256;

/// A seeded RC4 keystream generator.
#[derive(Debug, Clone)]
pub struct Rc4 {
    s: [u8; STATE_LEN],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Seed the generator from a non-negative integer key.
    pub fn new(key: &BigUint) -> Self {
        let key_bytes = key_to_256_le_bytes(key);
        let key_bytelen = key_bytelen(key);

        let mut s: [u8; STATE_LEN] = [0; STATE_LEN];
        for (idx, slot) in s.iter_mut().enumerate() {
            *slot = idx as u8;
        }

        let mut j: u8 = 0;
        for i in 0..255usize {
            let key_byte = key_bytes[i % key_bytelen];
            j = j.wrapping_add(s[i]).wrapping_add(key_byte);
            s.swap(i, j as usize);
        }

        Rc4 { s, i: 0, j: 0 }
    }

    /// Advance the PRGA by one step and return the next keystream byte.
    pub fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[idx as usize]
    }

    /// Produce the next `n` bytes of keystream (`produce_gamma`).
    pub fn produce_gamma(&mut self, n: usize) -> Vec<u8> {
        (0..n).map(|_| self.next_byte()).collect()
    }

    /// Encrypt or decrypt `data` against a freshly produced keystream of
    /// matching length. RC4 is its own inverse.
    pub fn apply(&mut self, data: &[u8]) -> Vec<u8> {
        let gamma = self.produce_gamma(data.len());
        xor_bytes(data, &gamma)
    }
}

/// `ceil(popcount(k) / 8)`, clamped to at least 1 so a zero key still
/// indexes into the key bytes.
fn key_bytelen(key: &BigUint) -> usize {
    let ones = key.count_ones() as usize;
    ones.div_ceil(8).max(1)
}

/// Serialize `key` as exactly 256 little-endian bytes, zero-padded.
fn key_to_256_le_bytes(key: &BigUint) -> [u8; 256] {
    let mut bytes = [0u8; 256];
    let le = key.to_bytes_le();
    let n = le.len().min(256);
    bytes[..n].copy_from_slice(&le[..n]);
    bytes
}

/// Element-wise XOR truncated to the shorter of the two inputs.
pub fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_equal_keys() {
        let k = BigUint::from(1u32);
        let mut a = Rc4::new(&k);
        let mut b = Rc4::new(&k);
        assert_eq!(a.produce_gamma(8), b.produce_gamma(8));
    }

    #[test]
    fn different_keys_diverge() {
        let mut a = Rc4::new(&BigUint::from(1u32));
        let mut b = Rc4::new(&BigUint::from(2u32));
        assert_ne!(a.produce_gamma(16), b.produce_gamma(16));
    }

    #[test]
    fn xor_is_involutive() {
        let k = BigUint::from(424242u32);
        let mut enc = Rc4::new(&k);
        let mut dec = Rc4::new(&k);
        let plain = b"the quick brown fox jumps over the lazy dog".to_vec();
        let cipher = enc.apply(&plain);
        let recovered = dec.apply(&cipher);
        assert_eq!(plain, recovered);
    }

    #[test]
    fn xor_bytes_truncates_to_shorter() {
        let out = xor_bytes(&[1, 2, 3, 4], &[0xff, 0xff]);
        assert_eq!(out, vec![0xfe, 0xfd]);
    }

    #[test]
    fn key_bytelen_uses_popcount_not_length() {
        // k = 0b1000_0000_0000_0000_0000_0000_0000_0001 has 2 set bits.
        let k = BigUint::from(0x8000_0001u32);
        assert_eq!(key_bytelen(&k), 1); // ceil(2/8) == 1
    }
}
