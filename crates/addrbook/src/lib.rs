//! # Peer Address Book
//!
//! A stochastic, attack-resistant database of known network peers for a
//! gossip-based node: which addresses to remember, which to dial, and
//! which to share.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** the bucketed new/tried tables, placement hashing,
//!   quality policy, and the on-disk codec
//! - **Ports Layer:** trait definitions for the host (clock, network
//!   grouping) and for consumers (`AddrBookApi`)
//! - **Adapters Layer:** system clock and prefix-based grouping
//!
//! ## Security Model
//!
//! - **Source bucketing:** addresses are spread over buckets keyed by a
//!   secret and by network group, capping how much of the table one actor
//!   can occupy
//! - **New/Tried segregation:** hearsay never displaces addresses we have
//!   connected to ourselves
//! - **Test-before-evict:** a tried incumbent keeps its slot until it
//!   demonstrably stops answering
//!
//! ## Example
//!
//! ```rust
//! use addrbook::{
//!     AddrBook, AddrBookApi, AddrBookConfig, NetAddr, PeerAddress, ServiceFlags, SocketAddr,
//! };
//! use addrbook::adapters::{PrefixNetGroup, SystemTimeSource};
//!
//! let book = AddrBook::new(
//!     AddrBookConfig::default(),
//!     Box::new(SystemTimeSource::new()),
//!     Box::new(PrefixNetGroup::new()),
//! );
//!
//! let source = NetAddr::v4(203, 1, 7, 9);
//! let addr = SocketAddr::new(NetAddr::v4(198, 71, 2, 3), 8333);
//! book.add(
//!     &[PeerAddress::new(addr, ServiceFlags::NONE, 0)],
//!     &source,
//!     0,
//! );
//!
//! if let Some((candidate, _last_try)) = book.select(false) {
//!     println!("dialing {}", candidate.socket);
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod testing;

// Re-export commonly used types
pub use domain::{
    AddrBookConfig, AddrBookState, AddressPosition, BookStats, NetAddr, Network, PeerAddress,
    SerializeError, ServiceFlags, SocketAddr, Timestamp,
};

// Re-export port traits
pub use ports::{AddrBookApi, NetGroupSource, TimeSource};

// Re-export service
pub use service::AddrBook;
