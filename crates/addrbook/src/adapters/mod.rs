//! Adapters
//!
//! Concrete implementations of the driven ports for production use.

pub mod netgroup;
pub mod time;

pub use netgroup::PrefixNetGroup;
pub use time::SystemTimeSource;
