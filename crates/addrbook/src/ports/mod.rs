//! Port Definitions
//!
//! Driving (inbound) and driven (outbound) interfaces of the address book.

pub mod inbound;
pub mod outbound;

pub use inbound::AddrBookApi;
pub use outbound::{NetGroupSource, TimeSource};
