//! Randomness Source
//!
//! One RNG type for every stochastic decision in the table (bucket picks,
//! rejection sampling, alias suppression, shuffles), with a deterministic
//! constructor so tests replay identically.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Seed used by deterministic mode.
const DETERMINISTIC_SEED: u64 = 1;

/// Table-internal random number generator.
///
/// Not cryptographic by itself; unpredictability of placements comes from
/// the secret bucket key, which this RNG generates once at construction in
/// non-deterministic mode.
pub struct AddrRng {
    inner: StdRng,
}

impl AddrRng {
    pub fn new(deterministic: bool) -> Self {
        let inner = if deterministic {
            StdRng::seed_from_u64(DETERMINISTIC_SEED)
        } else {
            StdRng::from_entropy()
        };
        Self { inner }
    }

    /// Uniform value in `[0, n)`. Returns 0 for `n == 0`.
    pub fn rand_range(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }

    pub fn rand_bool(&mut self) -> bool {
        self.inner.gen()
    }

    /// Uniform value with the given number of low bits, `bits <= 63`.
    pub fn rand_bits(&mut self, bits: u32) -> u64 {
        debug_assert!(bits <= 63);
        self.inner.next_u64() >> (64 - bits)
    }

    /// Fresh 256-bit key material.
    pub fn rand_key(&mut self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.inner.fill_bytes(&mut bytes);
        bytes
    }
}

impl std::fmt::Debug for AddrRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AddrRng(..)")
    }
}
