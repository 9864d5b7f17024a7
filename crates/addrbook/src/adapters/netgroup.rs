//! Network Group Adapter
//!
//! Default [`NetGroupSource`]: groups addresses by family prefix, /16 for
//! IPv4 and /32 for IPv6. Hosts with an AS-level mapping supply their own
//! adapter instead; the table never looks inside the returned key.

use crate::domain::addr::NetAddr;
use crate::ports::NetGroupSource;

/// Prefix length used for IPv4 groups, in bytes.
const IPV4_GROUP_BYTES: usize = 2;
/// Prefix length used for IPv6 groups, in bytes.
const IPV6_GROUP_BYTES: usize = 4;

/// Prefix-based grouping.
///
/// The key starts with a family tag so an IPv4 /16 and an IPv6 /32 with
/// coinciding bytes stay distinct groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixNetGroup;

impl PrefixNetGroup {
    pub fn new() -> Self {
        Self
    }
}

impl NetGroupSource for PrefixNetGroup {
    fn group(&self, addr: &NetAddr) -> Vec<u8> {
        let (tag, prefix_len) = match addr {
            NetAddr::V4(_) => (1u8, IPV4_GROUP_BYTES),
            NetAddr::V6(_) => (2u8, IPV6_GROUP_BYTES),
        };
        let mut key = Vec::with_capacity(1 + prefix_len);
        key.push(tag);
        key.extend_from_slice(&addr.as_bytes()[..prefix_len]);
        key
    }
}
