//! Address Book Service
//!
//! Wraps the domain state behind one exclusive lock and the injected time
//! source. Every public operation locks on entry, runs the probabilistic
//! consistency check before and after the mutation, and releases on exit;
//! nothing suspends or calls back out while holding the lock.

use parking_lot::Mutex;

use crate::domain::addr::Timestamp;
use crate::domain::book::AddrBookState;
use crate::domain::config::AddrBookConfig;
use crate::ports::{NetGroupSource, TimeSource};

/// The peer address manager.
///
/// Selection and sampling reshuffle internal state, which is why even the
/// logically read-only operations go through the same exclusive lock.
pub struct AddrBook {
    pub(crate) state: Mutex<AddrBookState>,
    pub(crate) time_source: Box<dyn TimeSource>,
}

impl AddrBook {
    /// Create an empty book.
    ///
    /// # Arguments
    ///
    /// * `config` - asmap, determinism and consistency-check settings
    /// * `time_source` - clock used by operations without an explicit `now`
    /// * `group` - network-group classification for bucketing
    pub fn new(
        config: AddrBookConfig,
        time_source: Box<dyn TimeSource>,
        group: Box<dyn NetGroupSource>,
    ) -> Self {
        Self {
            state: Mutex::new(AddrBookState::new(config, group)),
            time_source,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// Run one operation under the lock, bracketed by consistency checks.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut AddrBookState) -> R) -> R {
        let mut state = self.state.lock();
        state.check();
        let result = f(&mut state);
        state.check();
        result
    }
}

impl std::fmt::Debug for AddrBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AddrBook").field("state", &*state).finish()
    }
}
