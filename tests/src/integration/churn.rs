//! Randomized churn against a fully-checked table.
//!
//! Every operation runs with `consistency_check_ratio = 1`, so any
//! bookkeeping drift panics on the spot. The operation stream is driven by
//! a tiny LCG to stay reproducible without extra dependencies.

#[cfg(test)]
mod tests {
    use addrbook::testing::{peer, SteppableTimeSource};
    use addrbook::{
        AddrBook, AddrBookApi, AddrBookConfig, NetAddr, SocketAddr, Timestamp,
    };
    use addrbook::adapters::PrefixNetGroup;

    const NOW: i64 = 1_700_000_000;

    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn below(&mut self, n: u64) -> u64 {
            self.next() % n
        }
    }

    fn random_addr(rng: &mut Lcg) -> SocketAddr {
        SocketAddr::new(
            NetAddr::v4(
                250,
                rng.below(16) as u8,
                rng.below(256) as u8,
                1 + rng.below(250) as u8,
            ),
            8333,
        )
    }

    #[test]
    fn test_mixed_operation_soak_stays_consistent() {
        let clock = SteppableTimeSource::new(NOW);
        let book = AddrBook::new(
            AddrBookConfig::for_testing(),
            Box::new(clock.clone()),
            Box::new(PrefixNetGroup::new()),
        );
        let mut rng = Lcg(0x5eed);
        let mut known = Vec::new();

        for step in 0..4_000u64 {
            let now = Timestamp::new(NOW + step as i64);
            clock.set(now.as_secs());

            match rng.below(10) {
                0..=3 => {
                    let addr = random_addr(&mut rng);
                    let source = NetAddr::v4(250, rng.below(16) as u8, 0, 1);
                    let advertised = (now.as_secs() - rng.below(100_000) as i64).max(1) as u32;
                    book.add(&[peer(addr, advertised)], &source, rng.below(1_000) as i64);
                    known.push(addr);
                }
                4 => {
                    if let Some(addr) = known.get(rng.below(known.len().max(1) as u64) as usize) {
                        book.good(addr, now);
                    }
                }
                5 => {
                    if let Some(addr) = known.get(rng.below(known.len().max(1) as u64) as usize) {
                        book.attempt(addr, rng.below(2) == 0, now);
                    }
                }
                6 => {
                    if let Some(addr) = known.get(rng.below(known.len().max(1) as u64) as usize) {
                        book.connected(addr, now);
                    }
                }
                7 => {
                    book.select(rng.below(2) == 0);
                }
                8 => {
                    book.get_addr(rng.below(30) as usize, rng.below(100) as usize, None);
                }
                _ => {
                    book.resolve_collisions();
                    book.select_tried_collision();
                }
            }
        }

        let stats = book.stats();
        assert_eq!(stats.new_count + stats.tried_count, book.len());
        assert!(book.len() > 0);
    }

    #[test]
    fn test_soak_state_survives_round_trip() {
        let clock = SteppableTimeSource::new(NOW);
        let book = AddrBook::new(
            AddrBookConfig::for_testing(),
            Box::new(clock.clone()),
            Box::new(PrefixNetGroup::new()),
        );
        let mut rng = Lcg(0xfeed);

        for step in 0..1_500u64 {
            let now = Timestamp::new(NOW + step as i64);
            clock.set(now.as_secs());
            let addr = random_addr(&mut rng);
            let source = NetAddr::v4(250, rng.below(16) as u8, 0, 1);
            book.add(&[peer(addr, (now.as_secs() - 100) as u32)], &source, 0);
            if rng.below(5) == 0 {
                book.good(&addr, now);
            }
            if rng.below(7) == 0 {
                book.resolve_collisions();
            }
        }

        let mut bytes = Vec::new();
        book.serialize(&mut bytes).expect("serialize");

        let restored = AddrBook::new(
            AddrBookConfig::for_testing(),
            Box::new(clock.clone()),
            Box::new(PrefixNetGroup::new()),
        );
        restored.deserialize(&mut bytes.as_slice()).expect("deserialize");

        assert_eq!(restored.len(), book.len());
        assert_eq!(restored.stats().new_count, book.stats().new_count);
        assert_eq!(restored.stats().tried_count, book.stats().tried_count);

        let mut bytes_again = Vec::new();
        restored.serialize(&mut bytes_again).expect("serialize");
        assert_eq!(bytes, bytes_again, "reloaded table must serialize identically");
    }
}
