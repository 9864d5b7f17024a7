//! Address-flooding simulations.
//!
//! The structural defense under test: bucket placement is keyed by network
//! group, so a single origin can only ever reach a bounded slice of the
//! table no matter how many addresses it invents.

#[cfg(test)]
mod tests {
    use addrbook::adapters::PrefixNetGroup;
    use addrbook::testing::{peer, SteppableTimeSource};
    use addrbook::{AddrBook, AddrBookApi, AddrBookConfig, NetAddr, SocketAddr};

    const NOW: i64 = 1_700_000_000;

    fn make_book(clock: &SteppableTimeSource) -> AddrBook {
        AddrBook::new(
            AddrBookConfig::for_testing(),
            Box::new(clock.clone()),
            Box::new(PrefixNetGroup::new()),
        )
    }

    /// One source announcing thousands of addresses from one /16: the
    /// (address group, source group) pair pins a single new bucket, so at
    /// most 64 slots are reachable.
    #[test]
    fn test_single_group_flood_is_confined_to_one_bucket() {
        let clock = SteppableTimeSource::new(NOW);
        let book = make_book(&clock);
        let source = NetAddr::v4(250, 200, 0, 1);

        for c in 0..=255u8 {
            for d in 1..=8u8 {
                let addr = SocketAddr::new(NetAddr::v4(250, 99, c, d), 8333);
                book.add(&[peer(addr, (NOW - 60) as u32)], &source, 0);
            }
        }

        let stats = book.stats();
        assert!(
            stats.new_count <= 64,
            "flood of one group from one source must stay within one bucket, got {}",
            stats.new_count,
        );
        assert_eq!(stats.tried_count, 0, "hearsay never reaches the tried table");
    }

    /// A source spraying addresses across many /16 groups reaches more
    /// buckets, but never more than its per-source allowance.
    #[test]
    fn test_multi_group_flood_is_confined_to_source_allowance() {
        let clock = SteppableTimeSource::new(NOW);
        let book = make_book(&clock);
        let source = NetAddr::v4(250, 201, 0, 1);

        for b in 0..=255u8 {
            for d in 1..=32u8 {
                let addr = SocketAddr::new(NetAddr::v4(250, b, 7, d), 8333);
                book.add(&[peer(addr, (NOW - 60) as u32)], &source, 0);
            }
        }

        // 64 reachable buckets x 64 slots
        let stats = book.stats();
        assert!(
            stats.new_count <= 64 * 64,
            "one source may reach at most its bucket allowance, got {}",
            stats.new_count,
        );
    }
}
