//! Domain Layer
//!
//! Pure address-table logic: types, placement hashing, the multi-keyed
//! index, the state machine, quality policy, and the on-disk codec. No I/O
//! and no clock access — time always arrives as a parameter.

pub mod addr;
pub mod book;
pub mod config;
pub mod entry;
pub mod errors;
pub mod hashing;
pub mod index;
pub mod policy;
pub mod rng;
pub mod serialize;

pub use addr::{NetAddr, Network, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
pub use book::{AddrBookState, BookStats};
pub use config::AddrBookConfig;
pub use entry::{AddrEntry, AddrStats, AddressPosition, EntryId};
pub use errors::SerializeError;
pub use hashing::{BucketKey, BUCKET_SIZE, NEW_BUCKET_COUNT, TRIED_BUCKET_COUNT};
pub use index::AddrIndex;
pub use policy::{chance, is_terrible, MAX_NEW_REFS, TRIED_COLLISION_CAP};
pub use rng::AddrRng;
pub use serialize::{Format, FILE_FORMAT};
