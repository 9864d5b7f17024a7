//! Table Entries
//!
//! One record per (address, source) pair. An address heard from several
//! sources owns one *canonical* entry carrying all statistics plus up to
//! seven *alias* entries that record the extra sources; aliases exist only
//! in the new table.

use crate::domain::addr::{NetAddr, PeerAddress, ServiceFlags, SocketAddr, Timestamp};

/// Arena handle for an entry. Never reused within one table lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

/// Connection statistics for a canonical entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddrStats {
    /// Liveness timestamp claimed by the network. Untrusted, rate-limited
    /// on update. `0` means unknown.
    pub time: u32,
    /// Advertised capability bits, OR-merged across announcements.
    pub services: ServiceFlags,
    /// Last connection attempt by us, successful or not.
    pub last_try: Timestamp,
    /// Last attempt that was counted as a failure.
    pub last_count_attempt: Timestamp,
    /// Last successful connection by us.
    pub last_success: Timestamp,
    /// Attempts since the last success.
    pub attempts: i32,
}

/// A single record in the address table.
#[derive(Debug, Clone)]
pub struct AddrEntry {
    /// The endpoint this entry describes.
    pub addr: SocketAddr,
    /// Where knowledge about `addr` came from.
    pub source: NetAddr,
    /// Which table the entry lives in.
    pub in_tried: bool,
    /// True for secondary occurrences of an address that only record an
    /// additional source. Aliases carry no statistics and never sit in the
    /// tried table.
    pub alias: bool,
    /// Current bucket, as computed by the placement hash.
    pub bucket: u32,
    /// Current position within that bucket.
    pub bucket_pos: u32,
    /// Index into the random-sample vector; `None` iff alias.
    pub random_pos: Option<u32>,
    /// Statistics; meaningful on canonical entries only.
    pub stats: AddrStats,
}

impl AddrEntry {
    pub fn new(addr: SocketAddr, source: NetAddr) -> Self {
        Self {
            addr,
            source,
            in_tried: false,
            alias: false,
            bucket: 0,
            bucket_pos: 0,
            random_pos: None,
            stats: AddrStats::default(),
        }
    }

    /// The slot this entry currently occupies.
    pub fn slot(&self) -> (bool, u32, u32) {
        (self.in_tried, self.bucket, self.bucket_pos)
    }

    /// Reassemble the gossip-level view of this entry.
    pub fn peer_address(&self) -> PeerAddress {
        PeerAddress::new(self.addr, self.stats.services, self.stats.time)
    }
}

/// Where an address sits in the table, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPosition {
    /// Whether the canonical entry is in the tried table.
    pub tried: bool,
    /// Number of records for the address (canonical plus aliases).
    pub multiplicity: usize,
    pub bucket: u32,
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::addr::NetAddr;

    #[test]
    fn test_new_entry_starts_canonical_in_new() {
        let addr = SocketAddr::new(NetAddr::v4(1, 2, 3, 4), 8333);
        let entry = AddrEntry::new(addr, NetAddr::v4(5, 6, 7, 8));

        assert!(!entry.in_tried);
        assert!(!entry.alias);
        assert_eq!(entry.stats, AddrStats::default());
        assert_eq!(entry.random_pos, None);
    }

    #[test]
    fn test_peer_address_reflects_stats() {
        let addr = SocketAddr::new(NetAddr::v4(1, 2, 3, 4), 8333);
        let mut entry = AddrEntry::new(addr, NetAddr::v4(5, 6, 7, 8));
        entry.stats.time = 777;
        entry.stats.services = ServiceFlags(5);

        let peer = entry.peer_address();
        assert_eq!(peer.socket, addr);
        assert_eq!(peer.time, 777);
        assert_eq!(peer.services, ServiceFlags(5));
    }
}
