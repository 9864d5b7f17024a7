//! Multi-Keyed Entry Index
//!
//! All entries live in one arena, reachable through two orderings:
//!
//! - **by address**: `(addr, alias, id)` ascending, so the canonical entry
//!   for an address immediately precedes its aliases, aliases in insertion
//!   order. Used for lookup, alias grouping and serialization sources.
//! - **by bucket**: `(in_tried, bucket, position)`. Slots are unique, so
//!   this ordering doubles as the slot-occupancy map and yields new-table
//!   entries before tried ones, in bucket order.
//!
//! The index maintains the orderings mechanically; which mutations are
//! legal (slot collisions, alias bookkeeping, counters) is the caller's
//! protocol, not enforced here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::addr::SocketAddr;
use crate::domain::entry::{AddrEntry, EntryId};

#[derive(Debug, Default)]
pub struct AddrIndex {
    entries: HashMap<EntryId, AddrEntry>,
    by_address: BTreeSet<(SocketAddr, bool, EntryId)>,
    by_bucket: BTreeMap<(bool, u32, u32), EntryId>,
    next_id: u64,
}

impl AddrIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&AddrEntry> {
        self.entries.get(&id)
    }

    /// Insert a fully prepared entry (bucket fields already derived).
    ///
    /// The target slot must be free; colliding inserts are a protocol bug
    /// upstream.
    pub fn insert(&mut self, entry: AddrEntry) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;

        debug_assert!(!self.by_bucket.contains_key(&entry.slot()));
        self.by_address.insert((entry.addr, entry.alias, id));
        self.by_bucket.insert(entry.slot(), id);
        self.entries.insert(id, entry);
        id
    }

    /// Remove an entry from the arena and both orderings.
    pub fn remove(&mut self, id: EntryId) -> Option<AddrEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_address.remove(&(entry.addr, entry.alias, id));
        self.by_bucket.remove(&entry.slot());
        Some(entry)
    }

    /// Re-add an entry under an id previously handed out by [`insert`]
    /// (and since [`remove`]d), keeping every external reference to that id
    /// valid. This is how in-place modification works: remove, rewrite,
    /// restore.
    ///
    /// [`insert`]: Self::insert
    /// [`remove`]: Self::remove
    pub fn restore(&mut self, id: EntryId, entry: AddrEntry) {
        debug_assert!(id.0 < self.next_id);
        debug_assert!(!self.entries.contains_key(&id));
        debug_assert!(!self.by_bucket.contains_key(&entry.slot()));
        self.by_address.insert((entry.addr, entry.alias, id));
        self.by_bucket.insert(entry.slot(), id);
        self.entries.insert(id, entry);
    }

    /// Overwrite an entry's random-vector position. The position is not
    /// part of either ordering, so no re-indexing happens.
    pub fn set_random_pos(&mut self, id: EntryId, pos: Option<u32>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.random_pos = pos;
        }
    }

    /// The canonical (non-alias) entry for an address, if any.
    pub fn find_canonical(&self, addr: &SocketAddr) -> Option<EntryId> {
        self.by_address
            .range((*addr, false, EntryId(0))..=(*addr, false, EntryId(u64::MAX)))
            .next()
            .map(|(_, _, id)| *id)
    }

    /// The first alias entry for an address, if any.
    pub fn first_alias(&self, addr: &SocketAddr) -> Option<EntryId> {
        self.by_address
            .range((*addr, true, EntryId(0))..=(*addr, true, EntryId(u64::MAX)))
            .next()
            .map(|(_, _, id)| *id)
    }

    /// Number of records for an address: canonical plus aliases.
    pub fn count_addr(&self, addr: &SocketAddr) -> usize {
        self.ids_for_addr(addr).count()
    }

    /// All ids for an address in by-address order (canonical first).
    pub fn ids_for_addr<'a>(
        &'a self,
        addr: &SocketAddr,
    ) -> impl Iterator<Item = EntryId> + 'a {
        self.by_address
            .range((*addr, false, EntryId(0))..=(*addr, true, EntryId(u64::MAX)))
            .map(|(_, _, id)| *id)
    }

    /// The entry occupying a slot, if any.
    pub fn slot(&self, in_tried: bool, bucket: u32, pos: u32) -> Option<EntryId> {
        self.by_bucket.get(&(in_tried, bucket, pos)).copied()
    }

    /// Iterate in bucket order: new table first, then tried, each sorted by
    /// `(bucket, position)`.
    pub fn iter_by_bucket(&self) -> impl Iterator<Item = (EntryId, &AddrEntry)> {
        self.by_bucket
            .values()
            .filter_map(move |id| self.entries.get(id).map(|e| (*id, e)))
    }

    /// Iterate in address order: for each address the canonical entry, then
    /// its aliases.
    pub fn iter_by_address(&self) -> impl Iterator<Item = (EntryId, &AddrEntry)> {
        self.by_address
            .iter()
            .filter_map(move |(_, _, id)| self.entries.get(id).map(|e| (*id, e)))
    }

    /// Number of occupied slots. Equals `len()` whenever the orderings are
    /// consistent; the checker compares the two.
    pub fn occupied_slots(&self) -> usize {
        self.by_bucket.len()
    }
}
