//! Address Book Core
//!
//! The state machine over the new/tried tables: absorbing gossiped
//! addresses, promoting verified ones, test-before-evict collision
//! handling, randomized dial selection, and `getaddr` sampling.
//!
//! ## Anti-Eclipse Properties
//!
//! 1. Secret-keyed bucketing caps how much of either table any single
//!    source group can reach.
//! 2. The tried table only ever holds addresses we connected to ourselves;
//!    hearsay stays in the new table.
//! 3. A full tried slot is never surrendered to a newcomer while its
//!    incumbent still answers (test-before-evict).
//!
//! All operations here take `&mut self` and an explicit `now`; locking and
//! clock access belong to the service layer.

use std::collections::BTreeSet;

use tracing::{debug, error};

use crate::domain::addr::{NetAddr, Network, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
use crate::domain::config::AddrBookConfig;
use crate::domain::entry::{AddrEntry, AddressPosition, EntryId};
use crate::domain::hashing::{
    self, BucketKey, BUCKET_SIZE, NEW_BUCKET_COUNT, TRIED_BUCKET_COUNT,
};
use crate::domain::index::AddrIndex;
use crate::domain::policy::{
    self, MAX_NEW_REFS, REPLACEMENT_HOURS, TEST_WINDOW_SECS, TRIED_COLLISION_CAP,
};
use crate::domain::rng::AddrRng;
use crate::ports::NetGroupSource;

/// Seconds within which an advertised timestamp counts as "currently
/// online", which tightens the time-update rate limit.
const ONLINE_WINDOW_SECS: i64 = 24 * 60 * 60;
/// Minimum age of a stored timestamp before `connected` refreshes it.
const CONNECTED_UPDATE_SECS: i64 = 20 * 60;

/// Counts reported by [`AddrBookState::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookStats {
    /// Unique addresses in the new table.
    pub new_count: usize,
    /// Addresses in the tried table.
    pub tried_count: usize,
    /// Promotions parked behind test-before-evict.
    pub collision_backlog: usize,
}

/// The address table state. Single-threaded; the service wraps it in a
/// mutex.
pub struct AddrBookState {
    /// All entries, reachable by address and by slot.
    pub(crate) index: AddrIndex,
    /// Randomly-ordered canonical entries, backing `select`-free sampling.
    /// Each canonical entry stores its own position.
    pub(crate) random: Vec<EntryId>,
    /// Unique new-table addresses. Kept in lockstep with the index.
    pub(crate) n_new: i32,
    /// Tried-table addresses. Kept in lockstep with the index.
    pub(crate) n_tried: i32,
    /// Last time `good` ran. Starts at 1 so "never" is strictly worse.
    pub(crate) last_good: Timestamp,
    /// Canonical new-table entries whose promotion awaits an eviction test.
    pub(crate) tried_collisions: BTreeSet<EntryId>,
    /// Secret placement key. Wiped on drop.
    pub(crate) key: BucketKey,
    pub(crate) rng: AddrRng,
    consistency_check_ratio: i32,
    asmap: Vec<bool>,
    group: Box<dyn NetGroupSource>,
}

impl AddrBookState {
    pub fn new(config: AddrBookConfig, group: Box<dyn NetGroupSource>) -> Self {
        let mut rng = AddrRng::new(config.deterministic);
        let key = if config.deterministic {
            BucketKey::deterministic()
        } else {
            BucketKey::new(rng.rand_key())
        };
        Self {
            index: AddrIndex::new(),
            random: Vec::new(),
            n_new: 0,
            n_tried: 0,
            last_good: Timestamp::new(1),
            tried_collisions: BTreeSet::new(),
            key,
            rng,
            consistency_check_ratio: config.consistency_check_ratio,
            asmap: config.asmap,
            group,
        }
    }

    /// Number of unique addresses in the table.
    pub fn len(&self) -> usize {
        self.random.len()
    }

    pub fn is_empty(&self) -> bool {
        self.random.is_empty()
    }

    /// The AS mapping this table was configured with.
    pub fn asmap(&self) -> &[bool] {
        &self.asmap
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            new_count: self.n_new.max(0) as usize,
            tried_count: self.n_tried.max(0) as usize,
            collision_backlog: self.tried_collisions.len(),
        }
    }

    // =========================================================================
    // PLACEMENT & BOOKKEEPING PRIMITIVES
    // =========================================================================

    /// Bucket and position for an (address, source, table) triple, as the
    /// hasher dictates.
    pub(crate) fn placement(
        &self,
        addr: &SocketAddr,
        source: &NetAddr,
        in_tried: bool,
    ) -> (u32, u32) {
        let addr_key = addr.key_bytes();
        if in_tried {
            let group = self.group.group(&addr.addr);
            let bucket = hashing::tried_bucket(&self.key, &addr_key, &group);
            let pos = hashing::bucket_position(&self.key, false, bucket, &addr_key);
            (bucket, pos)
        } else {
            let addr_group = self.group.group(&addr.addr);
            let source_group = self.group.group(source);
            let bucket = hashing::new_bucket(&self.key, &addr_group, &source_group);
            let pos = hashing::bucket_position(&self.key, true, bucket, &addr_key);
            (bucket, pos)
        }
    }

    /// Adjust `n_new`/`n_tried` for one entry. Aliases are not counted.
    fn stat_delta(&mut self, entry: &AddrEntry, delta: i32) {
        if entry.random_pos.is_some() {
            if entry.in_tried {
                self.n_tried += delta;
            } else {
                self.n_new += delta;
            }
        }
    }

    /// Insert a prepared entry, deriving its slot and random position.
    /// The target slot must be free.
    pub(crate) fn insert(&mut self, mut entry: AddrEntry, alias: bool) -> EntryId {
        entry.alias = alias;
        let (bucket, pos) = self.placement(&entry.addr, &entry.source, entry.in_tried);
        entry.bucket = bucket;
        entry.bucket_pos = pos;
        entry.random_pos = if alias {
            None
        } else {
            Some(self.random.len() as u32)
        };
        self.stat_delta(&entry, 1);
        let id = self.index.insert(entry);
        if !alias {
            self.random.push(id);
        }
        id
    }

    /// Rewrite an entry in place and re-derive its slot.
    ///
    /// Callers must ensure the re-derived slot is free (it is, whenever `f`
    /// leaves address and source untouched).
    pub(crate) fn modify<F>(&mut self, id: EntryId, f: F)
    where
        F: FnOnce(&mut AddrEntry),
    {
        let mut entry = match self.index.remove(id) {
            Some(e) => e,
            None => return,
        };
        self.stat_delta(&entry, -1);
        f(&mut entry);
        let (bucket, pos) = self.placement(&entry.addr, &entry.source, entry.in_tried);
        entry.bucket = bucket;
        entry.bucket_pos = pos;
        self.stat_delta(&entry, 1);
        self.index.restore(id, entry);
    }

    /// Swap two positions of the random vector, updating the entries'
    /// back-pointers.
    pub(crate) fn swap_random(&mut self, pos1: usize, pos2: usize) {
        if pos1 == pos2 {
            return;
        }
        debug_assert!(pos1 < self.random.len() && pos2 < self.random.len());

        let id1 = self.random[pos1];
        let id2 = self.random[pos2];
        self.index.set_random_pos(id1, Some(pos2 as u32));
        self.index.set_random_pos(id2, Some(pos1 as u32));
        self.random.swap(pos1, pos2);
    }

    /// Remove one record of an address.
    ///
    /// Erasing a canonical entry that still has aliases merges instead: the
    /// canonical adopts the first alias's source (and with it that alias's
    /// slot), the alias record disappears, and any collision-set membership
    /// stays on the canonical. Only the last record of an address leaves the
    /// random vector.
    pub(crate) fn erase(&mut self, id: EntryId) {
        let (addr, in_tried, bucket, bucket_pos, random_pos) = match self.index.get(id) {
            Some(e) => (e.addr, e.in_tried, e.bucket, e.bucket_pos, e.random_pos),
            None => return,
        };

        if let Some(random_pos) = random_pos {
            if let Some(alias_id) = self.index.first_alias(&addr) {
                let alias_source = match self.index.get(alias_id) {
                    Some(alias) => alias.source,
                    None => return,
                };
                let alias_was_pending = self.tried_collisions.remove(&alias_id);
                self.index.remove(alias_id);
                if alias_was_pending {
                    self.tried_collisions.insert(id);
                }
                self.modify(id, |e| e.source = alias_source);
                return;
            }
            let last = self.random.len() - 1;
            self.swap_random(random_pos as usize, last);
            self.random.pop();
        }

        debug!(
            table = if in_tried { "tried" } else { "new" },
            bucket, position = bucket_pos, addr = %addr, "removed entry",
        );
        self.tried_collisions.remove(&id);
        if let Some(entry) = self.index.remove(id) {
            self.stat_delta(&entry, -1);
        }
    }

    /// Move an address from the new table to the tried table.
    ///
    /// Every new-table record of the address vanishes (aliases included).
    /// An incumbent in the target tried slot is demoted back into its new
    /// slot, evicting whatever occupies that.
    pub(crate) fn make_tried(&mut self, id: EntryId) {
        let info = match self.index.get(id) {
            Some(e) => e.clone(),
            None => return,
        };
        debug_assert!(!info.in_tried);

        // all references to this address vanish from new
        loop {
            let next = self.index.ids_for_addr(&info.addr).next();
            match next {
                Some(any) => self.erase(any),
                None => break,
            }
        }

        let mut promoted = info;
        promoted.in_tried = true;
        let (bucket, pos) = self.placement(&promoted.addr, &promoted.source, true);

        if let Some(victim_id) = self.index.slot(true, bucket, pos) {
            let victim = match self.index.get(victim_id) {
                Some(e) => e.clone(),
                None => return,
            };
            self.erase(victim_id);

            let mut demoted = victim;
            demoted.in_tried = false;
            let (new_bucket, new_pos) = self.placement(&demoted.addr, &demoted.source, false);
            if let Some(occupant) = self.index.slot(false, new_bucket, new_pos) {
                self.erase(occupant);
            }
            // cannot normally happen (tried entries have no new-table
            // siblings), but the insert stays correct if it ever does
            let demote_as_alias = self.index.find_canonical(&demoted.addr).is_some();
            debug!(
                addr = %demoted.addr,
                from_bucket = bucket, from_position = pos,
                to_bucket = new_bucket, to_position = new_pos,
                "moved incumbent from tried to new to make space",
            );
            self.insert(demoted, demote_as_alias);
        }

        self.insert(promoted, false);
    }

    // =========================================================================
    // ADD
    // =========================================================================

    /// Absorb one gossiped address. Returns whether a record was inserted.
    fn add_single(
        &mut self,
        addr: &PeerAddress,
        source: &NetAddr,
        mut time_penalty: i64,
        now: Timestamp,
    ) -> bool {
        if !addr.socket.is_routable() {
            return false;
        }

        // self-announcements carry no penalty
        if addr.socket.addr == *source {
            time_penalty = 0;
        }

        let canonical = self.index.find_canonical(&addr.socket);
        let alias;

        if let Some(id) = canonical {
            // Periodically accept a fresher advertised timestamp. The rate
            // limit keeps one chatty peer from pinning the entry fresh.
            let currently_online = now.as_secs() - (addr.time as i64) < ONLINE_WINDOW_SECS;
            let update_interval: i64 = if currently_online { 60 } else { 24 * 60 * 60 };
            let stored_time = match self.index.get(id) {
                Some(e) => e.stats.time,
                None => return false,
            };
            if addr.time != 0
                && (stored_time == 0
                    || (stored_time as i64) < addr.time as i64 - update_interval - time_penalty)
            {
                let fresher = (addr.time as i64 - time_penalty).max(0) as u32;
                self.modify(id, |e| e.stats.time = fresher);
            }

            let services = addr.services;
            self.modify(id, |e| e.stats.services |= services);

            let entry = match self.index.get(id) {
                Some(e) => e,
                None => return false,
            };

            // no new information
            if addr.time == 0 || (entry.stats.time != 0 && addr.time <= entry.stats.time) {
                return false;
            }

            // tried addresses do not grow aliases
            if entry.in_tried {
                return false;
            }

            let references = self.index.count_addr(&addr.socket);
            if references == MAX_NEW_REFS {
                return false;
            }

            // stochastic damping: with k references, growing to k+1 succeeds
            // with probability 2^-k
            let factor = 1u64 << references;
            if factor > 1 && self.rng.rand_range(factor) != 0 {
                return false;
            }

            alias = true;
        } else {
            alias = false;
        }

        let mut entry = AddrEntry::new(addr.socket, *source);
        if !alias {
            entry.stats.time = (addr.time as i64 - time_penalty).max(0) as u32;
            entry.stats.services = addr.services;
        }

        let (bucket, pos) = self.placement(&entry.addr, &entry.source, false);
        let mut do_insert = true;
        if let Some(existing_id) = self.index.slot(false, bucket, pos) {
            let existing = match self.index.get(existing_id) {
                Some(e) => e.clone(),
                None => return false,
            };
            if existing.addr == entry.addr {
                return false;
            }
            // evict only a terrible incumbent, or (when inserting a
            // canonical) one that is still referenced elsewhere
            do_insert = policy::is_terrible(&existing.stats, now)
                || (!alias && self.index.count_addr(&existing.addr) > 1);
            if do_insert {
                self.erase(existing_id);
            }
        }

        if do_insert {
            debug!(
                addr = %entry.addr, source = %entry.source,
                bucket, position = pos, alias,
                "added entry to new table",
            );
            self.insert(entry, alias);
        }
        do_insert
    }

    /// Absorb a batch of gossiped addresses from one source. Returns true
    /// if any record was inserted.
    pub fn add(
        &mut self,
        addrs: &[PeerAddress],
        source: &NetAddr,
        time_penalty: i64,
        now: Timestamp,
    ) -> bool {
        let mut added = 0usize;
        for addr in addrs {
            if self.add_single(addr, source, time_penalty, now) {
                added += 1;
            }
        }
        if added > 0 {
            debug!(
                added,
                offered = addrs.len(),
                source = %source,
                tried = self.n_tried,
                new = self.n_new,
                "absorbed addresses",
            );
        }
        added > 0
    }

    // =========================================================================
    // GOOD / ATTEMPT / CONNECTED / SET_SERVICES
    // =========================================================================

    /// Mark an address as successfully connected, promoting it toward the
    /// tried table. Returns true iff the address moved into tried.
    pub(crate) fn good_inner(
        &mut self,
        addr: &SocketAddr,
        test_before_evict: bool,
        now: Timestamp,
    ) -> bool {
        self.last_good = now;

        let id = match self.index.find_canonical(addr) {
            Some(id) => id,
            None => return false,
        };

        // `time` is deliberately left alone: refreshing it on success would
        // advertise who we are connected to.
        self.modify(id, |e| {
            e.stats.last_success = now;
            e.stats.last_try = now;
            e.stats.attempts = 0;
        });

        let entry = match self.index.get(id) {
            Some(e) => e,
            None => return false,
        };
        if entry.in_tried {
            return false;
        }

        let (bucket, pos) = self.placement(&entry.addr, &entry.source, true);
        if let Some(colliding_id) = self.index.slot(true, bucket, pos) {
            if test_before_evict {
                if self.tried_collisions.len() < TRIED_COLLISION_CAP {
                    self.tried_collisions.insert(id);
                }
                if let Some(colliding) = self.index.get(colliding_id) {
                    debug!(
                        incumbent = %colliding.addr, candidate = %addr,
                        backlog = self.tried_collisions.len(),
                        "tried slot collision, deferring promotion",
                    );
                }
                return false;
            }
        }

        self.make_tried(id);
        debug!(addr = %addr, bucket, position = pos, "moved entry to tried table");
        true
    }

    /// Public form of [`good_inner`](Self::good_inner) with
    /// test-before-evict enabled.
    pub fn good(&mut self, addr: &SocketAddr, now: Timestamp) -> bool {
        self.good_inner(addr, true, now)
    }

    /// Record a connection attempt.
    pub fn attempt(&mut self, addr: &SocketAddr, count_failure: bool, now: Timestamp) {
        let id = match self.index.find_canonical(addr) {
            Some(id) => id,
            None => return,
        };
        let last_good = self.last_good;
        self.modify(id, |e| {
            e.stats.last_try = now;
            // a run of failures between two successes is only counted once
            if count_failure && e.stats.last_count_attempt < last_good {
                e.stats.last_count_attempt = now;
                e.stats.attempts += 1;
            }
        });
    }

    /// Note that a connection to the peer is alive, refreshing its
    /// advertised timestamp at most every 20 minutes.
    pub fn connected(&mut self, addr: &SocketAddr, now: Timestamp) {
        let id = match self.index.find_canonical(addr) {
            Some(id) => id,
            None => return,
        };
        let stored = match self.index.get(id) {
            Some(e) => e.stats.time,
            None => return,
        };
        if now.as_secs() - stored as i64 > CONNECTED_UPDATE_SECS {
            let fresh = now.as_secs().max(0) as u32;
            self.modify(id, |e| e.stats.time = fresh);
        }
    }

    /// Overwrite the advertised service bits of an address.
    pub fn set_services(&mut self, addr: &SocketAddr, services: ServiceFlags) {
        let id = match self.index.find_canonical(addr) {
            Some(id) => id,
            None => return,
        };
        self.modify(id, |e| e.stats.services = services);
    }

    // =========================================================================
    // COLLISION RESOLUTION
    // =========================================================================

    /// Work through the test-before-evict backlog.
    pub fn resolve_collisions(&mut self, now: Timestamp) {
        let pending: Vec<EntryId> = self.tried_collisions.iter().copied().collect();
        for id in pending {
            if !self.tried_collisions.contains(&id) {
                continue;
            }
            let candidate = match self.index.get(id) {
                Some(e) => e.clone(),
                None => {
                    self.tried_collisions.remove(&id);
                    continue;
                }
            };

            let (bucket, pos) = self.placement(&candidate.addr, &candidate.source, true);
            let mut resolved = false;

            match self.index.slot(true, bucket, pos) {
                None => {
                    // not a collision anymore
                    self.good_inner(&candidate.addr, false, now);
                    resolved = true;
                }
                Some(incumbent_id) => {
                    let incumbent = match self.index.get(incumbent_id) {
                        Some(e) => e.clone(),
                        None => continue,
                    };

                    if now.since(incumbent.stats.last_success) < REPLACEMENT_HOURS * 60 * 60 {
                        // incumbent connected recently; keep it
                        resolved = true;
                    } else if now.since(incumbent.stats.last_try) < REPLACEMENT_HOURS * 60 * 60 {
                        // incumbent was tested and failed, but give it at
                        // least a minute to finish connecting
                        if now.since(incumbent.stats.last_try) > 60 {
                            debug!(
                                evicted = %incumbent.addr, promoted = %candidate.addr,
                                "replacing incumbent in tried table",
                            );
                            self.good_inner(&candidate.addr, false, now);
                            resolved = true;
                        }
                    } else if now.since(candidate.stats.last_success) > TEST_WINDOW_SECS {
                        // the test never happened in a reasonable window;
                        // evict the incumbent anyway
                        debug!(
                            evicted = %incumbent.addr, promoted = %candidate.addr,
                            "eviction test expired, replacing incumbent anyway",
                        );
                        self.good_inner(&candidate.addr, false, now);
                        resolved = true;
                    }
                }
            }

            if resolved {
                self.tried_collisions.remove(&id);
            }
        }
    }

    /// A random incumbent standing in the way of a pending promotion, for
    /// the caller to probe ("feeler" dial).
    pub fn select_tried_collision(&mut self) -> Option<(PeerAddress, Timestamp)> {
        if self.tried_collisions.is_empty() {
            return None;
        }
        let pick = self.rng.rand_range(self.tried_collisions.len() as u64) as usize;
        let id = *self.tried_collisions.iter().nth(pick)?;
        let candidate = self.index.get(id)?;

        let (bucket, pos) = self.placement(&candidate.addr, &candidate.source, true);
        let incumbent_id = self.index.slot(true, bucket, pos)?;
        let incumbent = self.index.get(incumbent_id)?;
        Some((incumbent.peer_address(), incumbent.stats.last_try))
    }

    // =========================================================================
    // SELECTION & SAMPLING
    // =========================================================================

    /// Pick an address to dial.
    ///
    /// Chooses new or tried with equal probability, then rejection-samples
    /// within random buckets; the acceptance factor climbs by 1.2 per
    /// rejection so the loop terminates quickly even in sparse tables.
    pub fn select(&mut self, new_only: bool, now: Timestamp) -> Option<(PeerAddress, Timestamp)> {
        if self.index.is_empty() {
            return None;
        }
        if new_only && self.n_new == 0 {
            return None;
        }

        let use_tried = !new_only && self.n_tried > 0 && (self.n_new == 0 || self.rng.rand_bool());
        let (in_tried, bucket_count) = if use_tried {
            (true, TRIED_BUCKET_COUNT)
        } else {
            (false, NEW_BUCKET_COUNT)
        };

        let mut chance_factor = 1.0f64;
        loop {
            let bucket = self.rng.rand_range(bucket_count as u64) as u32;
            let start = self.rng.rand_range(BUCKET_SIZE as u64) as u32;

            let mut found = None;
            for i in 0..BUCKET_SIZE {
                let pos = (start + i) % BUCKET_SIZE;
                if let Some(id) = self.index.slot(in_tried, bucket, pos) {
                    found = Some(id);
                    break;
                }
            }
            let id = match found {
                Some(id) => id,
                // empty bucket; try a (likely) different one
                None => continue,
            };

            // an alias slot stands in for its canonical record
            let (peer, last_try, chance) = {
                let entry = self.index.get(id)?;
                let canonical_id = if entry.alias {
                    self.index.find_canonical(&entry.addr)?
                } else {
                    id
                };
                let canonical = self.index.get(canonical_id)?;
                (
                    canonical.peer_address(),
                    canonical.stats.last_try,
                    policy::chance(&canonical.stats, now),
                )
            };

            let accept =
                (self.rng.rand_bits(30) as f64) < chance_factor * chance * (1u64 << 30) as f64;
            if accept {
                debug!(
                    addr = %peer.socket,
                    table = if in_tried { "tried" } else { "new" },
                    "selected entry",
                );
                return Some((peer, last_try));
            }
            chance_factor *= 1.2;
        }
    }

    /// Sample addresses for a `getaddr` reply: a prefix Fisher–Yates walk
    /// over the random vector, skipping entries that fail the network
    /// filter or are terrible.
    pub fn get_addr(
        &mut self,
        max_addresses: usize,
        max_pct: usize,
        network: Option<Network>,
        now: Timestamp,
    ) -> Vec<PeerAddress> {
        let total = self.random.len();
        let mut wanted = total;
        if max_pct != 0 {
            wanted = max_pct * wanted / 100;
        }
        if max_addresses != 0 {
            wanted = wanted.min(max_addresses);
        }

        let mut addresses = Vec::new();
        for n in 0..total {
            if addresses.len() >= wanted {
                break;
            }

            let pick = self.rng.rand_range((total - n) as u64) as usize + n;
            self.swap_random(n, pick);

            let entry = match self.index.get(self.random[n]) {
                Some(e) => e,
                None => continue,
            };
            if let Some(network) = network {
                if entry.addr.network() != network {
                    continue;
                }
            }
            if policy::is_terrible(&entry.stats, now) {
                continue;
            }
            addresses.push(entry.peer_address());
        }
        debug!(returned = addresses.len(), "get_addr sampled addresses");
        addresses
    }

    /// Where an address currently sits, if we know it.
    pub fn find_address_entry(&self, addr: &SocketAddr) -> Option<AddressPosition> {
        let id = self.index.find_canonical(addr)?;
        let entry = self.index.get(id)?;
        Some(AddressPosition {
            tried: entry.in_tried,
            multiplicity: if entry.in_tried {
                1
            } else {
                self.index.count_addr(addr)
            },
            bucket: entry.bucket,
            position: entry.bucket_pos,
        })
    }

    // =========================================================================
    // CONSISTENCY
    // =========================================================================

    /// Probabilistic consistency check. A detected violation is fatal: the
    /// table is not designed to survive one.
    pub fn check(&mut self) {
        if self.consistency_check_ratio <= 0 {
            return;
        }
        if self.rng.rand_range(self.consistency_check_ratio as u64) >= 1 {
            return;
        }
        let code = self.check_consistency();
        if code != 0 {
            error!(code, "address table consistency check failed");
            panic!("address table consistency check failed with code {code}");
        }
    }

    /// Full consistency check. Returns 0 or an error code identifying the
    /// violated invariant.
    pub fn check_consistency(&self) -> i32 {
        let mut counted_new: i32 = 0;
        let mut counted_tried: i32 = 0;
        let mut prev_addr: Option<SocketAddr> = None;

        for (id, entry) in self.index.iter_by_address() {
            if entry.alias != entry.random_pos.is_none() {
                return -4;
            }
            if entry.alias {
                // aliases live in new only, directly after their canonical
                if entry.in_tried {
                    return -1;
                }
                if prev_addr != Some(entry.addr) {
                    return -2;
                }
            } else {
                let random_pos = match entry.random_pos {
                    Some(p) => p as usize,
                    None => return -4,
                };
                if random_pos >= self.random.len() {
                    return -22;
                }
                if self.random[random_pos] != id {
                    return -23;
                }
                if entry.in_tried {
                    counted_tried += 1;
                } else {
                    counted_new += 1;
                }
                if prev_addr == Some(entry.addr) {
                    return -3;
                }
            }

            let (bucket, pos) = self.placement(&entry.addr, &entry.source, entry.in_tried);
            if bucket != entry.bucket || pos != entry.bucket_pos {
                return -5;
            }
            prev_addr = Some(entry.addr);
        }

        if counted_new != self.n_new {
            return -6;
        }
        if counted_tried != self.n_tried {
            return -7;
        }
        if (counted_new + counted_tried) as usize != self.random.len() {
            return -8;
        }
        if self.index.occupied_slots() != self.index.len() {
            return -10;
        }

        0
    }
}

impl std::fmt::Debug for AddrBookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddrBookState")
            .field("n_new", &self.n_new)
            .field("n_tried", &self.n_tried)
            .field("collision_backlog", &self.tried_collisions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PrefixNetGroup;
    use crate::domain::entry::AddrStats;
    use crate::testing::{peer, routable_v4};

    const NOW: i64 = 1_700_000_000;

    fn make_state() -> AddrBookState {
        AddrBookState::new(AddrBookConfig::for_testing(), Box::new(PrefixNetGroup::new()))
    }

    fn stats_of(state: &AddrBookState, addr: &SocketAddr) -> AddrStats {
        let id = state.index.find_canonical(addr).expect("entry known");
        state.index.get(id).expect("entry known").stats
    }

    // =========================================================================
    // TEST GROUP 1: Attempt / Connected / SetServices Statistics
    // =========================================================================

    #[test]
    fn test_attempt_counts_failures_once_between_successes() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        state.add(&[peer(addr, (NOW - 100) as u32)], &addr.addr, 0, Timestamp::new(NOW));

        state.attempt(&addr, true, Timestamp::new(NOW + 10));
        assert_eq!(stats_of(&state, &addr).attempts, 1);
        assert_eq!(stats_of(&state, &addr).last_try, Timestamp::new(NOW + 10));

        // a second failure before any success is not re-counted
        state.attempt(&addr, true, Timestamp::new(NOW + 20));
        assert_eq!(stats_of(&state, &addr).attempts, 1);
        assert_eq!(stats_of(&state, &addr).last_try, Timestamp::new(NOW + 20));

        // uncounted attempts never bump the counter
        state.attempt(&addr, false, Timestamp::new(NOW + 30));
        assert_eq!(stats_of(&state, &addr).attempts, 1);

        state.good(&addr, Timestamp::new(NOW + 40));
        assert_eq!(stats_of(&state, &addr).attempts, 0);

        // after a success, the next failure counts again
        state.attempt(&addr, true, Timestamp::new(NOW + 50));
        assert_eq!(stats_of(&state, &addr).attempts, 1);
    }

    #[test]
    fn test_connected_refreshes_only_old_timestamps() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let advertised = (NOW - 2 * 60 * 60) as u32;
        state.add(&[peer(addr, advertised)], &addr.addr, 0, Timestamp::new(NOW));

        state.connected(&addr, Timestamp::new(NOW));
        assert_eq!(stats_of(&state, &addr).time, NOW as u32);

        // within the 20 minute window nothing changes
        state.connected(&addr, Timestamp::new(NOW + 60));
        assert_eq!(stats_of(&state, &addr).time, NOW as u32);
    }

    #[test]
    fn test_good_does_not_touch_advertised_time() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let advertised = (NOW - 100) as u32;
        state.add(&[peer(addr, advertised)], &addr.addr, 0, Timestamp::new(NOW));

        state.good(&addr, Timestamp::new(NOW + 1_000));
        assert_eq!(stats_of(&state, &addr).time, advertised);
        assert_eq!(stats_of(&state, &addr).last_success, Timestamp::new(NOW + 1_000));
    }

    #[test]
    fn test_set_services_overwrites_merged_bits() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let mut record = peer(addr, (NOW - 100) as u32);
        record.services = ServiceFlags(0b01);
        state.add(&[record], &addr.addr, 0, Timestamp::new(NOW));

        // a re-announcement merges service bits
        let mut record = peer(addr, (NOW - 100) as u32);
        record.services = ServiceFlags(0b10);
        state.add(&[record], &NetAddr::v4(250, 9, 0, 1), 0, Timestamp::new(NOW));
        assert_eq!(stats_of(&state, &addr).services, ServiceFlags(0b11));

        // set_services replaces instead of merging
        state.set_services(&addr, ServiceFlags(0b100));
        assert_eq!(stats_of(&state, &addr).services, ServiceFlags(0b100));
    }

    // =========================================================================
    // TEST GROUP 2: Add Policy
    // =========================================================================

    #[test]
    fn test_repeated_add_is_idempotent_on_counts() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let source = NetAddr::v4(250, 9, 0, 1);
        let record = peer(addr, (NOW - 100) as u32);

        assert!(state.add(&[record], &source, 0, Timestamp::new(NOW)));
        for _ in 0..8 {
            assert!(!state.add(&[record], &source, 0, Timestamp::new(NOW)));
        }
        assert_eq!(state.stats().new_count, 1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_reference_count_never_exceeds_cap() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let base = (NOW - 3_600) as u32;
        state.add(&[peer(addr, base)], &NetAddr::v4(250, 10, 0, 1), 0, Timestamp::new(NOW));

        for i in 0..200u32 {
            let advertised = base + 1 + (i % 59);
            let source = NetAddr::v4(250, (10 + i % 200) as u8, (i / 4) as u8, 1);
            state.add(&[peer(addr, advertised)], &source, 0, Timestamp::new(NOW));
        }

        assert!(state.index.count_addr(&addr) <= MAX_NEW_REFS);
        assert_eq!(state.stats().new_count, 1);
        assert_eq!(state.check_consistency(), 0);
    }

    #[test]
    fn test_terrible_incumbent_is_overwritten() {
        let mut state = make_state();
        let source = NetAddr::v4(250, 9, 0, 1);

        // advertised time 0: stale, overwrite costs nothing
        let doomed = routable_v4(90, 0, 1);
        state.add(&[peer(doomed, 0)], &source, 0, Timestamp::new(NOW));
        let slot = {
            let id = state.index.find_canonical(&doomed).expect("inserted");
            state.index.get(id).expect("inserted").slot()
        };

        // same /16 keeps the bucket fixed; scan for a position collision
        let mut challenger = None;
        'search: for c in 0..=255u8 {
            for d in 1..=254u8 {
                let candidate = SocketAddr::new(NetAddr::v4(250, 90, c, d), 8333);
                if candidate == doomed {
                    continue;
                }
                let (bucket, pos) = state.placement(&candidate, &source, false);
                if (false, bucket, pos) == slot {
                    challenger = Some(candidate);
                    break 'search;
                }
            }
        }
        let challenger = challenger.expect("a colliding candidate in the same /16");

        assert!(state.add(
            &[peer(challenger, (NOW - 100) as u32)],
            &source,
            0,
            Timestamp::new(NOW),
        ));
        assert!(state.index.find_canonical(&doomed).is_none(), "terrible incumbent evicted");
        assert!(state.index.find_canonical(&challenger).is_some());
        assert_eq!(state.check_consistency(), 0);
    }

    #[test]
    fn test_healthy_incumbent_is_not_overwritten() {
        let mut state = make_state();
        let source = NetAddr::v4(250, 9, 0, 1);

        let incumbent = routable_v4(90, 0, 1);
        state.add(&[peer(incumbent, (NOW - 100) as u32)], &source, 0, Timestamp::new(NOW));
        let slot = {
            let id = state.index.find_canonical(&incumbent).expect("inserted");
            state.index.get(id).expect("inserted").slot()
        };

        let mut challenger = None;
        'search: for c in 0..=255u8 {
            for d in 1..=254u8 {
                let candidate = SocketAddr::new(NetAddr::v4(250, 90, c, d), 8333);
                if candidate == incumbent {
                    continue;
                }
                let (bucket, pos) = state.placement(&candidate, &source, false);
                if (false, bucket, pos) == slot {
                    challenger = Some(candidate);
                    break 'search;
                }
            }
        }
        let challenger = challenger.expect("a colliding candidate in the same /16");

        assert!(!state.add(
            &[peer(challenger, (NOW - 100) as u32)],
            &source,
            0,
            Timestamp::new(NOW),
        ));
        assert!(state.index.find_canonical(&incumbent).is_some(), "incumbent survives");
        assert!(state.index.find_canonical(&challenger).is_none());
    }

    // =========================================================================
    // TEST GROUP 3: Promotion Internals
    // =========================================================================

    #[test]
    fn test_make_tried_removes_every_new_reference() {
        let mut state = make_state();
        let addr = routable_v4(1, 2, 3);
        let base = (NOW - 3_600) as u32;
        state.add(&[peer(addr, base)], &NetAddr::v4(250, 10, 0, 1), 0, Timestamp::new(NOW));

        // grow at least one alias before promoting
        let mut grown = false;
        for i in 0..60u8 {
            state.add(
                &[peer(addr, base + 1 + i as u32)],
                &NetAddr::v4(250, 20 + i, 3, 1),
                0,
                Timestamp::new(NOW),
            );
            if state.index.count_addr(&addr) >= 2 {
                grown = true;
                break;
            }
        }
        assert!(grown, "alias growth under the damping cap");

        assert!(state.good(&addr, Timestamp::new(NOW)));

        assert_eq!(state.index.count_addr(&addr), 1, "aliases vanish on promotion");
        let position = state.find_address_entry(&addr).expect("entry known");
        assert!(position.tried);
        assert_eq!(state.stats().new_count, 0);
        assert_eq!(state.stats().tried_count, 1);
        assert_eq!(state.check_consistency(), 0);
    }

    #[test]
    fn test_counters_track_mixed_operations() {
        let mut state = make_state();
        let now = Timestamp::new(NOW);

        for i in 0..10u8 {
            let addr = routable_v4(100 + i, 4, 4);
            state.add(&[peer(addr, (NOW - 100) as u32)], &NetAddr::v4(250, 100 + i, 0, 1), 0, now);
        }
        let after_adds = state.stats();
        assert_eq!(after_adds.new_count as usize + after_adds.tried_count as usize, state.len());

        let promoted = routable_v4(100, 4, 4);
        state.good(&promoted, now);
        state.attempt(&promoted, true, now.add_secs(10));
        state.connected(&promoted, now.add_secs(20));

        assert_eq!(state.check_consistency(), 0);
        let stats = state.stats();
        assert_eq!(stats.new_count + stats.tried_count, state.len());
    }
}
