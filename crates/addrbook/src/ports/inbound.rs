//! Driving Ports (Inbound API)
//!
//! The public surface of the address book as seen by the node: absorbing
//! gossip, recording connection outcomes, picking dial candidates, and
//! answering `getaddr`.
//!
//! Operations that merely fail to find an address are silent no-ops (or
//! return `false`); policy rejections inside `add` are likewise absorbed
//! into the return value. Only the codec methods can error.

use std::io::{Read, Write};

use crate::domain::addr::{NetAddr, Network, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
use crate::domain::book::BookStats;
use crate::domain::entry::AddressPosition;
use crate::domain::errors::SerializeError;

/// Primary API of the address book.
///
/// Implementations serialize all calls internally; the trait takes `&self`
/// everywhere even though selection and sampling reshuffle internal state.
pub trait AddrBookApi {
    /// Number of unique addresses across both tables.
    fn len(&self) -> usize;

    /// Whether the book holds no addresses at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absorb gossiped addresses from `source`, applying `time_penalty`
    /// seconds to their advertised timestamps. Returns true if any record
    /// was inserted.
    fn add(&self, addrs: &[PeerAddress], source: &NetAddr, time_penalty: i64) -> bool;

    /// Mark an outbound connection to `addr` as successful at `now`.
    /// Returns true iff the address was promoted into the tried table.
    fn good(&self, addr: &SocketAddr, now: Timestamp) -> bool;

    /// Record a connection attempt at `now`; `count_failure` charges the
    /// attempt against the address's quality.
    fn attempt(&self, addr: &SocketAddr, count_failure: bool, now: Timestamp);

    /// Note that the connection to `addr` is still alive at `now`.
    fn connected(&self, addr: &SocketAddr, now: Timestamp);

    /// Overwrite the advertised service bits of `addr`.
    fn set_services(&self, addr: &SocketAddr, services: ServiceFlags);

    /// Work through the test-before-evict backlog.
    fn resolve_collisions(&self);

    /// A tried-table incumbent blocking a pending promotion, picked at
    /// random, together with its last attempt time. The caller is expected
    /// to probe it and report back via [`good`](Self::good) or
    /// [`attempt`](Self::attempt).
    fn select_tried_collision(&self) -> Option<(PeerAddress, Timestamp)>;

    /// Pick an address to dial, with its last attempt time. `new_only`
    /// restricts the draw to the new table.
    fn select(&self, new_only: bool) -> Option<(PeerAddress, Timestamp)>;

    /// Sample up to `max_addresses` addresses (and at most `max_pct`
    /// percent of the table; either limit may be 0 for "no limit"),
    /// optionally restricted to one network.
    fn get_addr(
        &self,
        max_addresses: usize,
        max_pct: usize,
        network: Option<Network>,
    ) -> Vec<PeerAddress>;

    /// Where `addr` sits in the table, if known.
    fn find_address_entry(&self, addr: &SocketAddr) -> Option<AddressPosition>;

    /// Write the whole table to `w` in the current format.
    fn serialize(&self, w: &mut dyn Write) -> Result<(), SerializeError>;

    /// Replace the (empty) table with the contents of `r`.
    fn deserialize(&self, r: &mut dyn Read) -> Result<(), SerializeError>;

    /// The AS mapping this book was configured with.
    fn asmap(&self) -> Vec<bool>;

    /// Table occupancy counters.
    fn stats(&self) -> BookStats;
}
