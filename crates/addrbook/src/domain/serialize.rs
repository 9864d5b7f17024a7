//! On-Disk Codec
//!
//! Versioned binary format for the whole table. The current format (5)
//! stores one record per unique address with its statistics and the full
//! source list, iterated in bucket order; bucket assignments themselves are
//! never stored — the loader recomputes every placement from the serialized
//! secret key and the current network-group mapping, so group-mapping
//! changes and parameter changes survive a restart without breaking the
//! file.
//!
//! Older formats (0–4) are read-only: their per-entry records are
//! self-contained and their trailing bucket-layout section and asmap
//! checksum are parsed and discarded.
//!
//! Layout notes (all integers little-endian unless noted):
//!
//! - header: `format u8`, `compat u8` (32 + lowest compatible format),
//!   `key [u8; 32]`, `n_new i32`, `n_tried i32`, and for formats < 5 the
//!   historical `bucket_count XOR 2^30`.
//! - addresses: family-tagged records (`time u32`, `services u64`,
//!   `net u8`, `len u8`, bytes, `port u16` big-endian) for formats >= 3;
//!   formats < 3 store fixed 16-byte IPv4-mapped IPv6 instead of the
//!   tag/length form.

use std::io::{Read, Write};

use tracing::debug;

use crate::domain::addr::{NetAddr, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
use crate::domain::book::AddrBookState;
use crate::domain::entry::AddrEntry;
use crate::domain::errors::SerializeError;
use crate::domain::hashing::BucketKey;

/// Serialization format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Format {
    /// Historic format, no version tagging of the bucket count.
    V0Historical = 0,
    /// Deterministically keyed files.
    V1Deterministic = 1,
    /// Adds the asmap checksum trailer.
    V2Asmap = 2,
    /// Family-tagged variable-length addresses.
    V3Bip155 = 3,
    /// Multiple ports per address.
    V4Multiport = 4,
    /// One record per unique address with explicit source lists.
    V5MultiIndex = 5,
}

/// The format every write uses, and the maximum we know how to read.
pub const FILE_FORMAT: u8 = Format::V5MultiIndex as u8;

/// Base value of the compatibility byte. Historically the key-size field,
/// which is why it starts at 32.
const INCOMPATIBILITY_BASE: u8 = 32;

/// Lowest format a reader must understand to parse our output.
const LOWEST_COMPATIBLE: u8 = Format::V5MultiIndex as u8;

// =============================================================================
// PRIMITIVE READERS / WRITERS
// =============================================================================

fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<(), SerializeError> {
    w.write_all(&[v])?;
    Ok(())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<(), SerializeError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<(), SerializeError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<(), SerializeError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> Result<(), SerializeError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, SerializeError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, SerializeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, SerializeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, SerializeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R) -> Result<i64, SerializeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

// =============================================================================
// ADDRESS RECORDS
// =============================================================================

/// Wire tag for each address family.
fn net_id(addr: &NetAddr) -> u8 {
    match addr {
        NetAddr::V4(_) => 1,
        NetAddr::V6(_) => 2,
    }
}

fn write_netaddr<W: Write>(w: &mut W, addr: &NetAddr) -> Result<(), SerializeError> {
    let bytes = addr.as_bytes();
    write_u8(w, net_id(addr))?;
    write_u8(w, bytes.len() as u8)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_netaddr<R: Read>(r: &mut R) -> Result<NetAddr, SerializeError> {
    let net = read_u8(r)?;
    let len = read_u8(r)? as usize;
    match (net, len) {
        (1, 4) => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Ok(NetAddr::V4(buf))
        }
        (2, 16) => {
            let mut buf = [0u8; 16];
            r.read_exact(&mut buf)?;
            Ok(NetAddr::V6(buf))
        }
        _ => Err(SerializeError::Malformed(format!(
            "unknown network id {net} with length {len}"
        ))),
    }
}

/// Fixed-width address form used by formats < 3.
fn read_netaddr_v1<R: Read>(r: &mut R) -> Result<NetAddr, SerializeError> {
    let mut buf = [0u8; 16];
    r.read_exact(&mut buf)?;
    Ok(NetAddr::from_v6_mapped(buf))
}

fn write_peer_address<W: Write>(w: &mut W, addr: &PeerAddress) -> Result<(), SerializeError> {
    write_u32(w, addr.time)?;
    write_u64(w, addr.services.bits())?;
    write_netaddr(w, &addr.socket.addr)?;
    w.write_all(&addr.socket.port.to_be_bytes())?;
    Ok(())
}

fn read_port<R: Read>(r: &mut R) -> Result<u16, SerializeError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_peer_address<R: Read>(r: &mut R) -> Result<PeerAddress, SerializeError> {
    let time = read_u32(r)?;
    let services = ServiceFlags(read_u64(r)?);
    let addr = read_netaddr(r)?;
    let port = read_port(r)?;
    Ok(PeerAddress::new(SocketAddr::new(addr, port), services, time))
}

fn read_peer_address_v1<R: Read>(r: &mut R) -> Result<PeerAddress, SerializeError> {
    let time = read_u32(r)?;
    let services = ServiceFlags(read_u64(r)?);
    let addr = read_netaddr_v1(r)?;
    let port = read_port(r)?;
    Ok(PeerAddress::new(SocketAddr::new(addr, port), services, time))
}

// =============================================================================
// TABLE CODEC
// =============================================================================

impl AddrBookState {
    /// Write the table in the current format.
    ///
    /// Bucket order makes new-table records come out before tried ones,
    /// which is what the loader's `i < n_new` split relies on. Aliases are
    /// folded into their canonical record's source list.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<(), SerializeError> {
        write_u8(w, FILE_FORMAT)?;
        write_u8(w, INCOMPATIBILITY_BASE + LOWEST_COMPATIBLE)?;
        w.write_all(self.key.as_bytes())?;
        write_i32(w, self.n_new)?;
        write_i32(w, self.n_tried)?;

        for (_, entry) in self.index.iter_by_bucket() {
            // aliases are handled together with their canonical record
            if entry.alias {
                continue;
            }
            let alias_count = self.index.count_addr(&entry.addr);
            debug_assert!(!entry.in_tried || alias_count == 1);

            write_peer_address(w, &entry.peer_address())?;
            write_i64(w, entry.stats.last_try.as_secs())?;
            write_i64(w, entry.stats.last_count_attempt.as_secs())?;
            write_i64(w, entry.stats.last_success.as_secs())?;
            write_i32(w, entry.stats.attempts)?;
            if !entry.in_tried {
                write_u32(w, alias_count as u32)?;
            }
            for id in self.index.ids_for_addr(&entry.addr) {
                if let Some(record) = self.index.get(id) {
                    write_netaddr(w, &record.source)?;
                }
            }
        }
        Ok(())
    }

    /// Rebuild the table from a stream produced by any supported format.
    ///
    /// Placements are recomputed with the deserialized key and the current
    /// group mapping; two records contending for a slot resolve
    /// last-write-wins. Must be called on an empty table.
    pub fn deserialize<R: Read>(&mut self, r: &mut R) -> Result<(), SerializeError> {
        debug_assert!(self.index.is_empty());

        let format = read_u8(r)?;
        let compat = read_u8(r)?;
        let lowest_compatible = compat.wrapping_sub(INCOMPATIBILITY_BASE);
        if lowest_compatible > FILE_FORMAT {
            return Err(SerializeError::UnsupportedFormat {
                format,
                lowest_compatible,
                max_supported: FILE_FORMAT,
            });
        }

        let mut key = [0u8; 32];
        r.read_exact(&mut key)?;
        self.key = BucketKey::new(key);

        let read_new = read_i32(r)?;
        let read_tried = read_i32(r)?;
        if read_new < 0 || read_tried < 0 {
            return Err(SerializeError::Malformed(format!(
                "negative entry counts: new {read_new}, tried {read_tried}"
            )));
        }

        let mut bucket_count = 0i32;
        if format < Format::V5MultiIndex as u8 {
            bucket_count = read_i32(r)?;
            if format >= Format::V1Deterministic as u8 {
                bucket_count ^= 1 << 30;
            }
        }

        for i in 0..(read_new as i64 + read_tried as i64) {
            let in_tried = i >= read_new as i64;
            let peer;
            let mut last_try = Timestamp::new(0);
            let mut last_count_attempt = Timestamp::new(0);
            let last_success;
            let attempts;
            let mut sources: u32 = 1;
            let mut source = None;

            if format >= Format::V5MultiIndex as u8 {
                peer = read_peer_address(r)?;
                last_try = Timestamp::new(read_i64(r)?);
                last_count_attempt = Timestamp::new(read_i64(r)?);
                last_success = Timestamp::new(read_i64(r)?);
                attempts = read_i32(r)?;
                if !in_tried {
                    sources = read_u32(r)?;
                }
                if sources as usize > crate::domain::policy::MAX_NEW_REFS {
                    return Err(SerializeError::Malformed(format!(
                        "source count {sources} exceeds the reference cap"
                    )));
                }
                if sources > 0 {
                    source = Some(read_netaddr(r)?);
                }
            } else {
                // legacy self-contained record
                peer = if format >= Format::V3Bip155 as u8 {
                    read_peer_address(r)?
                } else {
                    read_peer_address_v1(r)?
                };
                source = Some(if format >= Format::V3Bip155 as u8 {
                    read_netaddr(r)?
                } else {
                    read_netaddr_v1(r)?
                });
                last_success = Timestamp::new(read_i64(r)?);
                attempts = read_i32(r)?;
            }

            for s in 0..sources {
                if s > 0 {
                    source = Some(read_netaddr(r)?);
                }
                let source = match source {
                    Some(src) => src,
                    None => break,
                };

                let mut entry = AddrEntry::new(peer.socket, source);
                entry.in_tried = in_tried;
                entry.stats.time = peer.time;
                entry.stats.services = peer.services;
                entry.stats.last_try = last_try;
                entry.stats.last_count_attempt = last_count_attempt;
                entry.stats.last_success = last_success;
                entry.stats.attempts = attempts;

                // last write wins on slot conflicts
                let (bucket, pos) = self.placement(&entry.addr, &entry.source, in_tried);
                if let Some(incumbent) = self.index.slot(in_tried, bucket, pos) {
                    self.erase(incumbent);
                }

                // A record for an already-known address becomes an alias in
                // new; a tried record instead supersedes every prior record
                // for that address.
                let mut alias = false;
                if self.index.ids_for_addr(&entry.addr).next().is_some() {
                    if in_tried {
                        loop {
                            let existing = self.index.ids_for_addr(&entry.addr).next();
                            match existing {
                                Some(id) => self.erase(id),
                                None => break,
                            }
                        }
                    } else {
                        alias = true;
                    }
                }

                self.insert(entry, alias);
            }
        }

        // bucket layout and asmap checksum of legacy formats carry no
        // information for the rebuilt table
        if format < Format::V5MultiIndex as u8 {
            for _ in 0..bucket_count {
                let entries = read_i32(r)?;
                for _ in 0..entries {
                    read_i32(r)?;
                }
            }
            if format >= Format::V2Asmap as u8 {
                let mut checksum = [0u8; 32];
                r.read_exact(&mut checksum)?;
            }
        }

        let code = self.check_consistency();
        if code != 0 {
            return Err(SerializeError::Corrupt(code));
        }

        debug!(
            format,
            new = self.n_new,
            tried = self.n_tried,
            "loaded address table",
        );
        Ok(())
    }
}
