//! Driven Ports (Outbound SPI)
//!
//! Interfaces the address book **requires** the host application to
//! implement. Keeping the clock and the network-group mapping behind traits
//! makes placements and time-based policy fully controllable in tests.

use crate::domain::addr::{NetAddr, Timestamp};

/// Abstract interface for time.
///
/// Production implementations read the system clock; tests use fixed or
/// steppable sources so expiry and rate-limit behavior is deterministic.
pub trait TimeSource: Send + Sync {
    /// Current time, seconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Abstract interface for network-group classification.
///
/// Maps an address to an opaque group key; addresses sharing a key are
/// treated as one origin for bucketing purposes. The host decides what a
/// group is — an address-family prefix, an AS number derived from an asmap,
/// or anything else — the table only compares the returned bytes.
///
/// # Security
///
/// Group granularity bounds the table share a single actor can claim: all
/// addresses in one group compete for a handful of buckets. A mapping that
/// lumps unrelated hosts together is safe; one that splits a single actor
/// into many groups weakens the flooding defense.
pub trait NetGroupSource: Send + Sync {
    /// Opaque group key for an address.
    fn group(&self, addr: &NetAddr) -> Vec<u8>;
}
