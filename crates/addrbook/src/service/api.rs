use std::io::{Read, Write};

use crate::domain::addr::{NetAddr, Network, PeerAddress, ServiceFlags, SocketAddr, Timestamp};
use crate::domain::book::BookStats;
use crate::domain::entry::AddressPosition;
use crate::domain::errors::SerializeError;
use crate::ports::AddrBookApi;
use crate::service::AddrBook;

impl AddrBookApi for AddrBook {
    fn len(&self) -> usize {
        self.state.lock().len()
    }

    fn add(&self, addrs: &[PeerAddress], source: &NetAddr, time_penalty: i64) -> bool {
        let now = self.now();
        self.with_state(|state| state.add(addrs, source, time_penalty, now))
    }

    fn good(&self, addr: &SocketAddr, now: Timestamp) -> bool {
        self.with_state(|state| state.good(addr, now))
    }

    fn attempt(&self, addr: &SocketAddr, count_failure: bool, now: Timestamp) {
        self.with_state(|state| state.attempt(addr, count_failure, now));
    }

    fn connected(&self, addr: &SocketAddr, now: Timestamp) {
        self.with_state(|state| state.connected(addr, now));
    }

    fn set_services(&self, addr: &SocketAddr, services: ServiceFlags) {
        self.with_state(|state| state.set_services(addr, services));
    }

    fn resolve_collisions(&self) {
        AddrBook::resolve_collisions(self);
    }

    fn select_tried_collision(&self) -> Option<(PeerAddress, Timestamp)> {
        AddrBook::select_tried_collision(self)
    }

    fn select(&self, new_only: bool) -> Option<(PeerAddress, Timestamp)> {
        let now = self.now();
        self.with_state(|state| state.select(new_only, now))
    }

    fn get_addr(
        &self,
        max_addresses: usize,
        max_pct: usize,
        network: Option<Network>,
    ) -> Vec<PeerAddress> {
        let now = self.now();
        self.with_state(|state| state.get_addr(max_addresses, max_pct, network, now))
    }

    fn find_address_entry(&self, addr: &SocketAddr) -> Option<AddressPosition> {
        self.with_state(|state| state.find_address_entry(addr))
    }

    fn serialize(&self, mut w: &mut dyn Write) -> Result<(), SerializeError> {
        self.state.lock().serialize(&mut w)
    }

    fn deserialize(&self, mut r: &mut dyn Read) -> Result<(), SerializeError> {
        self.state.lock().deserialize(&mut r)
    }

    fn asmap(&self) -> Vec<bool> {
        self.state.lock().asmap().to_vec()
    }

    fn stats(&self) -> BookStats {
        self.state.lock().stats()
    }
}
