//! Core Address Types
//!
//! Transport-level endpoints as gossiped between peers: an address family
//! plus raw bytes, a port, and the advertised metadata (services, liveness
//! timestamp) that ride along in `addr` messages.

use std::fmt;

/// Address family, used for wire tagging and `get_addr` filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Network {
    Ipv4,
    Ipv6,
}

/// A network address without a port.
///
/// Only the raw bytes matter to the table: grouping, routability and wire
/// encoding are derived from them. Two addresses are equal iff family and
/// bytes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetAddr {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl NetAddr {
    /// Create an IPv4 address.
    pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        NetAddr::V4([a, b, c, d])
    }

    /// Create an IPv6 address from raw bytes.
    pub fn v6(bytes: [u8; 16]) -> Self {
        NetAddr::V6(bytes)
    }

    /// The address family.
    pub fn network(&self) -> Network {
        match self {
            NetAddr::V4(_) => Network::Ipv4,
            NetAddr::V6(_) => Network::Ipv6,
        }
    }

    /// Raw address bytes (4 for IPv4, 16 for IPv6).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            NetAddr::V4(b) => b,
            NetAddr::V6(b) => b,
        }
    }

    /// IPv4-mapped IPv6 representation (`::ffff:a.b.c.d` for IPv4).
    ///
    /// Used by the legacy on-disk address encoding, which predates
    /// family-tagged records.
    pub fn to_v6_mapped(&self) -> [u8; 16] {
        match self {
            NetAddr::V4(b) => {
                let mut out = [0u8; 16];
                out[10] = 0xff;
                out[11] = 0xff;
                out[12..].copy_from_slice(b);
                out
            }
            NetAddr::V6(b) => *b,
        }
    }

    /// Reverse of [`to_v6_mapped`](Self::to_v6_mapped): detects the
    /// IPv4-mapped prefix and recovers the IPv4 form.
    pub fn from_v6_mapped(bytes: [u8; 16]) -> Self {
        if bytes[..10] == [0u8; 10] && bytes[10] == 0xff && bytes[11] == 0xff {
            NetAddr::V4([bytes[12], bytes[13], bytes[14], bytes[15]])
        } else {
            NetAddr::V6(bytes)
        }
    }

    /// Whether this address may appear on the public internet.
    ///
    /// Unroutable addresses are rejected at the door: they would waste table
    /// slots and can never yield a useful connection.
    pub fn is_routable(&self) -> bool {
        match self {
            NetAddr::V4(b) => {
                let unspecified = *b == [0, 0, 0, 0];
                let loopback = b[0] == 127;
                let private = b[0] == 10
                    || (b[0] == 172 && (16..32).contains(&b[1]))
                    || (b[0] == 192 && b[1] == 168);
                let link_local = b[0] == 169 && b[1] == 254;
                let documentation = (b[0] == 192 && b[1] == 0 && b[2] == 2)
                    || (b[0] == 198 && b[1] == 51 && b[2] == 100)
                    || (b[0] == 203 && b[1] == 0 && b[2] == 113);
                !(unspecified || loopback || private || link_local || documentation)
            }
            NetAddr::V6(b) => {
                let unspecified = *b == [0u8; 16];
                let loopback = {
                    let mut lo = [0u8; 16];
                    lo[15] = 1;
                    *b == lo
                };
                // fe80::/10 link-local, fc00::/7 unique-local, 2001:db8::/32 documentation
                let link_local = b[0] == 0xfe && (b[1] & 0xc0) == 0x80;
                let unique_local = (b[0] & 0xfe) == 0xfc;
                let documentation = b[0] == 0x20 && b[1] == 0x01 && b[2] == 0x0d && b[3] == 0xb8;
                !(unspecified || loopback || link_local || unique_local || documentation)
            }
        }
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAddr::V4(b) => write!(f, "{}.{}.{}.{}", b[0], b[1], b[2], b[3]),
            NetAddr::V6(b) => {
                let groups: Vec<String> = b
                    .chunks(2)
                    .map(|c| format!("{:x}", u16::from_be_bytes([c[0], c[1]])))
                    .collect();
                write!(f, "{}", groups.join(":"))
            }
        }
    }
}

/// A transport endpoint: address plus port.
///
/// This is the identity unit of the address table; every entry is keyed by
/// its `SocketAddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketAddr {
    pub addr: NetAddr,
    pub port: u16,
}

impl SocketAddr {
    pub fn new(addr: NetAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Canonical byte string identifying this endpoint.
    ///
    /// Feeds the bucket hasher; the exact layout (raw address bytes, then
    /// the port big-endian) is part of the placement contract.
    pub fn key_bytes(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(18);
        key.extend_from_slice(self.addr.as_bytes());
        key.extend_from_slice(&self.port.to_be_bytes());
        key
    }

    pub fn network(&self) -> Network {
        self.addr.network()
    }

    pub fn is_routable(&self) -> bool {
        self.addr.is_routable()
    }
}

impl fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            NetAddr::V4(_) => write!(f, "{}:{}", self.addr, self.port),
            NetAddr::V6(_) => write!(f, "[{}]:{}", self.addr, self.port),
        }
    }
}

/// Capability bitmask advertised by a peer.
///
/// The table never interprets individual bits; it only merges them
/// (bitwise OR) and stores them for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ServiceFlags(pub u64);

impl ServiceFlags {
    pub const NONE: ServiceFlags = ServiceFlags(0);

    pub fn bits(&self) -> u64 {
        self.0
    }
}

impl std::ops::BitOr for ServiceFlags {
    type Output = ServiceFlags;

    fn bitor(self, rhs: ServiceFlags) -> ServiceFlags {
        ServiceFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ServiceFlags {
    fn bitor_assign(&mut self, rhs: ServiceFlags) {
        self.0 |= rhs.0;
    }
}

/// Seconds since the Unix epoch. `0` means "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn new(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self` (negative if `earlier` is
    /// in the future).
    pub fn since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }

    pub fn add_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn sub_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

/// A gossiped address as it appears in `addr` messages: the endpoint plus
/// the services and last-known liveness time the announcing peer claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub socket: SocketAddr,
    pub services: ServiceFlags,
    /// Claimed liveness timestamp, seconds since epoch. Untrusted.
    pub time: u32,
}

impl PeerAddress {
    pub fn new(socket: SocketAddr, services: ServiceFlags, time: u32) -> Self {
        Self {
            socket,
            services,
            time,
        }
    }
}
