//! Centralized Testing Utilities
//!
//! Fixtures shared by the crate's unit tests and the workspace integration
//! tests: controllable clocks and routable address generators.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::domain::addr::{NetAddr, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
use crate::ports::TimeSource;

/// A time source that returns a fixed timestamp.
#[derive(Debug, Clone)]
pub struct FixedTimeSource {
    secs: i64,
}

impl FixedTimeSource {
    pub fn new(secs: i64) -> Self {
        Self { secs }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.secs)
    }
}

/// A time source tests can advance while the book holds a clone.
#[derive(Debug, Clone, Default)]
pub struct SteppableTimeSource {
    secs: Arc<AtomicI64>,
}

impl SteppableTimeSource {
    pub fn new(secs: i64) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(secs)),
        }
    }

    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for SteppableTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.secs.load(Ordering::SeqCst))
    }
}

/// A routable IPv4 endpoint in the 250.x.y.z range, far from any reserved
/// block. `a`/`b` select the /16 group.
pub fn routable_v4(b: u8, c: u8, d: u8) -> SocketAddr {
    SocketAddr::new(NetAddr::v4(250, b, c, d), 8333)
}

/// A gossip record for an endpoint with the given advertised time.
pub fn peer(socket: SocketAddr, time: u32) -> PeerAddress {
    PeerAddress::new(socket, ServiceFlags::NONE, time)
}
