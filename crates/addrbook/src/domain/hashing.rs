//! Bucket Placement Hashing
//!
//! Pure, keyed mapping from addresses to table slots. A secret 256-bit key
//! makes the placement of any given address unpredictable to peers, so an
//! attacker cannot precompute a set of addresses that all land in the same
//! bucket.
//!
//! The hash is double-SHA256 over a domain-separated byte stream; the low
//! eight bytes (little-endian) form the 64-bit output. Byte strings are
//! written with a one-byte length prefix, integers raw little-endian. These
//! details, together with the bucket counts below, fix the placement of
//! every entry and are part of the on-disk compatibility contract.

use sha2::{Digest, Sha256};

/// Number of buckets in the new table.
pub const NEW_BUCKET_COUNT: u32 = 1024;
/// Number of buckets in the tried table.
pub const TRIED_BUCKET_COUNT: u32 = 256;
/// Slots per bucket, in both tables.
pub const BUCKET_SIZE: u32 = 64;
/// Over how many tried buckets addresses from a single group are spread.
pub const TRIED_BUCKETS_PER_GROUP: u64 = 8;
/// Over how many new buckets addresses from a single source group are spread.
pub const NEW_BUCKETS_PER_SOURCE_GROUP: u64 = 64;

/// Secret key feeding the placement hash.
///
/// Generated once at construction and wiped on drop. Deterministic mode
/// fixes it to little-endian 1 so tests can precompute placements.
#[derive(Clone, PartialEq, Eq)]
pub struct BucketKey([u8; 32]);

impl BucketKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The fixed key used in deterministic mode.
    pub fn deterministic() -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        write!(f, "BucketKey(..)")
    }
}

impl Drop for BucketKey {
    fn drop(&mut self) {
        self.0 = [0u8; 32];
    }
}

/// Incremental writer for one keyed hash evaluation.
struct KeyedHasher {
    hasher: Sha256,
}

impl KeyedHasher {
    fn new(key: &BucketKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        Self { hasher }
    }

    /// Length-prefixed byte string. Group keys and address keys are always
    /// shorter than 256 bytes.
    fn write_bytes(mut self, bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() < 256);
        self.hasher.update([bytes.len() as u8]);
        self.hasher.update(bytes);
        self
    }

    fn write_u8(mut self, v: u8) -> Self {
        self.hasher.update([v]);
        self
    }

    fn write_u32(mut self, v: u32) -> Self {
        self.hasher.update(v.to_le_bytes());
        self
    }

    fn write_u64(mut self, v: u64) -> Self {
        self.hasher.update(v.to_le_bytes());
        self
    }

    /// Finish the double-SHA256 and truncate to 64 bits.
    fn finish(self) -> u64 {
        let first = self.hasher.finalize();
        let second = Sha256::digest(first);
        let mut low = [0u8; 8];
        low.copy_from_slice(&second[..8]);
        u64::from_le_bytes(low)
    }
}

/// In which tried bucket an address belongs.
///
/// Two rounds: the first confines the address to one of
/// [`TRIED_BUCKETS_PER_GROUP`] choices within its group, the second spreads
/// groups over the whole table.
pub fn tried_bucket(key: &BucketKey, addr_key: &[u8], group: &[u8]) -> u32 {
    let hash1 = KeyedHasher::new(key).write_bytes(addr_key).finish();
    let hash2 = KeyedHasher::new(key)
        .write_bytes(group)
        .write_u64(hash1 % TRIED_BUCKETS_PER_GROUP)
        .finish();
    (hash2 % TRIED_BUCKET_COUNT as u64) as u32
}

/// In which new bucket an address belongs, given the group of the source
/// that announced it.
///
/// Keyed by the (address group, source group) pair: a single source group
/// can reach at most [`NEW_BUCKETS_PER_SOURCE_GROUP`] buckets no matter how
/// many addresses it floods.
pub fn new_bucket(key: &BucketKey, addr_group: &[u8], source_group: &[u8]) -> u32 {
    let hash1 = KeyedHasher::new(key)
        .write_bytes(addr_group)
        .write_bytes(source_group)
        .finish();
    let hash2 = KeyedHasher::new(key)
        .write_bytes(source_group)
        .write_u64(hash1 % NEW_BUCKETS_PER_SOURCE_GROUP)
        .finish();
    (hash2 % NEW_BUCKET_COUNT as u64) as u32
}

/// Position within a bucket. The tag separates the new ('N') and tried
/// ('K') position domains.
pub fn bucket_position(key: &BucketKey, new_table: bool, bucket: u32, addr_key: &[u8]) -> u32 {
    let hash = KeyedHasher::new(key)
        .write_u8(if new_table { b'N' } else { b'K' })
        .write_u32(bucket)
        .write_bytes(addr_key)
        .finish();
    (hash % BUCKET_SIZE as u64) as u32
}
