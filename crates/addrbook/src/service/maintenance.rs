use crate::domain::addr::{PeerAddress, Timestamp};
use crate::service::AddrBook;

impl AddrBook {
    /// Work through the test-before-evict backlog.
    ///
    /// Call from a timer task. Pending promotions whose incumbent proved
    /// healthy are dropped; incumbents that failed their test (or were
    /// never testable within the window) are evicted and the candidates
    /// promoted.
    pub fn resolve_collisions(&self) {
        let now = self.now();
        self.with_state(|state| state.resolve_collisions(now));
    }

    /// A random tried-table incumbent standing in the way of a pending
    /// promotion. The caller should probe it and report the outcome via
    /// `good`/`attempt`, which is what makes `resolve_collisions` able to
    /// decide.
    pub fn select_tried_collision(&self) -> Option<(PeerAddress, Timestamp)> {
        self.with_state(|state| state.select_tried_collision())
    }
}
