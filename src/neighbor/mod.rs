use std::collections::BTreeMap;
use std::net;

use crate::area::lsdb::LsaIdentifier;
use crate::area::Scope;
use crate::lsa::{self, Header};
use crate::timer::TimerId;

pub mod status;

/// # Neighbor
/// an adjacency as reported by the neighbor state machine, with the
/// link state retransmission list the flooding procedure keeps for it.
pub struct Neighbor {
    pub id: net::Ipv4Addr,
    pub ifindex: u32,
    pub ipv4_addr: net::Ipv4Addr,
    pub state: status::Status,
    pub rxmt_timer: TimerId,
    retransmit: BTreeMap<(Scope, LsaIdentifier), Header>,
}

impl Neighbor {
    pub fn new(
        id: net::Ipv4Addr,
        ifindex: u32,
        ipv4_addr: net::Ipv4Addr,
        state: status::Status,
        rxmt_timer: TimerId,
    ) -> Self {
        Self {
            id,
            ifindex,
            ipv4_addr,
            state,
            rxmt_timer,
            retransmit: BTreeMap::new(),
        }
    }

    pub fn add_retransmit(&mut self, scope: Scope, header: Header) {
        self.retransmit
            .insert((scope, LsaIdentifier::from_header(&header)), header);
    }

    /// Drops a list entry when `ack` acknowledges the same instance.
    /// Returns whether an entry was removed.
    pub fn acknowledge(&mut self, scope: Scope, ack: &Header) -> bool {
        let key = (scope, LsaIdentifier::from_header(ack));
        match self.retransmit.get(&key) {
            Some(pending) if lsa::compare(pending, ack).is_eq() => {
                self.retransmit.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn remove_retransmit(&mut self, scope: Scope, lsa_id: &LsaIdentifier) -> bool {
        self.retransmit.remove(&(scope, *lsa_id)).is_some()
    }

    pub fn is_retransmitting(&self, scope: Scope, lsa_id: &LsaIdentifier) -> bool {
        self.retransmit.contains_key(&(scope, *lsa_id))
    }

    pub fn retransmit_list(&self) -> impl Iterator<Item = (&Scope, &LsaIdentifier)> + '_ {
        self.retransmit.keys().map(|(scope, lsa_id)| (scope, lsa_id))
    }

    pub fn retransmit_count(&self) -> usize {
        self.retransmit.len()
    }

    pub fn clear_retransmit(&mut self) {
        self.retransmit.clear();
    }
}
