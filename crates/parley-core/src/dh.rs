//! Diffie–Hellman parameter generation: random prime selection and
//! primitive-root search by totient factoring.
//!
//! Totient factoring runs entirely in-process (trial division up to a
//! bound, then Pollard's rho for the remaining cofactor), which is
//! sufficient for the 64-bit primes this system actually generates.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

pub const DEFAULT_MILLER_RABIN_ROUNDS: usize = 40;
/// Candidate primitive roots are drawn from this many bits, independent of
/// the prime's own bit-length — root candidates are searched over 32 bits
/// against a 64-bit prime, and that asymmetry is preserved rather than
/// "corrected" to match the prime's size.
pub const DEFAULT_ROOT_SEARCH_BITS: u64 = 32;
pub const DEFAULT_PRIME_BITS: u64 = 64;

/// `(g, p)`: a primitive root and the prime it is a root modulo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffieParams {
    pub g: BigUint,
    pub p: BigUint,
}

impl DiffieParams {
    /// Generate fresh parameters. CPU-heavy; call once at process startup.
    /// `miller_rabin_rounds` controls the witness-round count used while
    /// sieving for the prime; `crates/parley-core/src/config.rs`'s
    /// `CryptoConfig::miller_rabin_rounds` is the operator-facing knob that
    /// feeds this.
    pub fn generate(prime_bits: u64, root_search_bits: u64, miller_rabin_rounds: usize) -> Self {
        let p = get_random_prime(prime_bits, miller_rabin_rounds);
        let g = find_primitive_root(root_search_bits, &p);
        DiffieParams { g, p }
    }
}

/// Sample random odd `bits`-bit integers and Miller–Rabin test (`rounds`
/// witness rounds) until one passes.
pub fn get_random_prime(bits: u64, rounds: usize) -> BigUint {
    let mut rng = rand::thread_rng();
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(0, true);
        candidate.set_bit(bits - 1, true);
        if is_probably_prime(&candidate, rounds) {
            return candidate;
        }
    }
}

/// Draw random `bits`-bit candidates `g` coprime to `p`, accepting the
/// first one that is a primitive root: for every distinct prime factor `q`
/// of `totient = p - 1`, `g^(totient/q) mod p != 1`.
pub fn find_primitive_root(bits: u64, p: &BigUint) -> BigUint {
    let totient = p - BigUint::one();
    let divisors = distinct_prime_factors(&totient);
    let mut rng = rand::thread_rng();

    loop {
        let g = rng.gen_biguint(bits);
        if g.is_zero() || g.gcd(p) != BigUint::one() {
            continue;
        }
        let is_primitive = divisors
            .iter()
            .all(|q| g.modpow(&(&totient / q), p) != BigUint::one());
        if is_primitive {
            return g;
        }
    }
}

/// Distinct prime factors of `n`: trial division by small primes, then
/// Pollard's rho on whatever cofactor remains. A cofactor rho cannot split
/// within its iteration budget is treated as prime, mirroring the
/// reference's external-sieve-failure fallback.
pub fn distinct_prime_factors(n: &BigUint) -> Vec<BigUint> {
    let mut factors = Vec::new();
    let mut remaining = n.clone();

    let mut d = BigUint::from(2u32);
    while &d * &d <= remaining && d < BigUint::from(1_000_000u32) {
        if (&remaining % &d).is_zero() {
            factors.push(d.clone());
            while (&remaining % &d).is_zero() {
                remaining /= &d;
            }
        }
        d += BigUint::one();
    }

    if remaining > BigUint::one() {
        factor_remaining(&remaining, &mut factors);
    }

    factors
}

fn factor_remaining(n: &BigUint, out: &mut Vec<BigUint>) {
    if n == &BigUint::one() {
        return;
    }
    if is_probably_prime(n, DEFAULT_MILLER_RABIN_ROUNDS) {
        out.push(n.clone());
        return;
    }
    match pollard_rho(n) {
        Some(d) => {
            factor_remaining(&d, out);
            factor_remaining(&(n / &d), out);
        }
        // Rho failed to split within its budget: treat as prime.
        None => out.push(n.clone()),
    }
}

fn pollard_rho(n: &BigUint) -> Option<BigUint> {
    if n.is_even() {
        return Some(BigUint::from(2u32));
    }
    let mut rng = rand::thread_rng();
    let bits = n.bits().max(8);

    for _ in 0..20 {
        let c = rng.gen_biguint_below(n).max(BigUint::one());
        let mut x = rng.gen_biguint_below(n);
        let mut y = x.clone();
        let mut d = BigUint::one();

        let mut iterations = 0u64;
        while d == BigUint::one() && iterations < (1u64 << bits.min(32)) {
            x = (&x * &x + &c) % n;
            y = (&y * &y + &c) % n;
            y = (&y * &y + &c) % n;
            let diff = if x > y { &x - &y } else { &y - &x };
            if diff.is_zero() {
                break;
            }
            d = diff.gcd(n);
            iterations += 1;
        }

        if d != BigUint::one() && &d != n {
            return Some(d);
        }
    }
    None
}

/// Miller–Rabin primality test.
fn is_probably_prime(n: &BigUint, rounds: usize) -> bool {
    let zero = BigUint::zero();
    let one = BigUint::one();
    let two = BigUint::from(2u32);

    if n < &two {
        return false;
    }
    if n == &two || n == &BigUint::from(3u32) {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut r = 0u32;
    while d.is_even() {
        d >>= 1;
        r += 1;
    }

    let mut rng = rand::thread_rng();
    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &(n - &one));
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..r.saturating_sub(1) {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    let _ = zero;
    true
}
