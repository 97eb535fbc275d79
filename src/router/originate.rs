//! Originating, refreshing and flushing this router's own lsas.

use std::net;

use crate::area::lsdb::LsaIdentifier;
use crate::area::Scope;
use crate::lsa::router::{LinkState, RouterLSA, LS_ID_POINT_TO_POINT, LS_ID_STUB, ROUTER_FLAG_B, ROUTER_LSA_TYPE};
use crate::lsa::{
    Header, InitialSequenceNumber, Lsa, LsaBody, MaxAge, MaxSequenceNumber, OPTION_E, OPTION_O,
};
use crate::lsa::opaque::OPAQUE_AS_LSA_TYPE;
use crate::neighbor::status::Status;
use crate::util::ipv4_addr_to_bits;

use super::Router;

impl Router {
    fn options_for(&self, scope: Scope) -> u8 {
        match scope {
            Scope::As => OPTION_E | OPTION_O,
            Scope::Area(area_id) => match self.areas.get(&area_id) {
                Some(area) if area.stub => 0,
                _ => OPTION_E,
            },
        }
    }

    /// Originates `body` under our router id. Nothing goes out when the stored
    /// instance already says the same thing. Returns whether a new instance
    /// was flooded.
    pub(super) fn originate(&mut self, scope: Scope, link_state_id: u32, body: LsaBody) -> bool {
        if self.shutting_down {
            return false;
        }
        let lsa_id = LsaIdentifier {
            lsa_type: body.lsa_type() as u32,
            link_state_id,
            advertising_router: self.router_id,
        };
        if let Some(pending) = self.wrapped.get_mut(&(scope, lsa_id)) {
            *pending = body;
            return false;
        }
        let options = self.options_for(scope);
        let stored = self
            .lsdb(scope)
            .and_then(|lsdb| lsdb.fetch_entry(&lsa_id))
            .map(|entry| {
                let unchanged = !entry.flushing
                    && entry.lsa.header.options == options
                    && entry.lsa.body == body;
                (entry.lsa.header.sequence_number, unchanged)
            });
        match stored {
            Some((_, true)) => false,
            Some((sequence_number, false)) => {
                self.originate_after(scope, lsa_id, body, Some(sequence_number))
            }
            None => self.originate_after(scope, lsa_id, body, None),
        }
    }

    /// Builds, installs and floods the next instance after `previous`. At
    /// MaxSequenceNumber the current instance is flushed first and `body`
    /// waits until the flush is acknowledged everywhere.
    pub(super) fn originate_after(
        &mut self,
        scope: Scope,
        lsa_id: LsaIdentifier,
        body: LsaBody,
        previous: Option<i32>,
    ) -> bool {
        let sequence_number = match previous {
            None => InitialSequenceNumber,
            Some(previous) if previous == MaxSequenceNumber => {
                crate::util::log(&format!("{} reached MaxSequenceNumber, flushing", lsa_id));
                self.wrapped.insert((scope, lsa_id), body);
                self.flush(scope, &lsa_id);
                return false;
            }
            Some(previous) => previous + 1,
        };
        let header = Header::new(
            0,
            self.options_for(scope),
            lsa_id.lsa_type as u8,
            lsa_id.link_state_id,
            self.router_id,
            sequence_number,
        );
        let lsa = Lsa::new(header, body);
        crate::util::debug(&format!(
            "originating {} seq {:#010x} in {}",
            lsa_id, sequence_number as u32, scope
        ));
        self.install(scope, lsa.clone(), true);
        self.flood(scope, &lsa, None);
        self.stats.lsas_originated += 1;
        true
    }

    /// Reoriginates an own lsa with unchanged contents.
    pub(super) fn refresh(&mut self, scope: Scope, lsa_id: &LsaIdentifier) {
        let Some((body, sequence_number)) = self
            .lsdb(scope)
            .and_then(|lsdb| lsdb.fetch_entry(lsa_id))
            .map(|entry| (entry.lsa.body.clone(), entry.lsa.header.sequence_number))
        else {
            return;
        };
        self.originate_after(scope, *lsa_id, body, Some(sequence_number));
    }

    /// Withdraws one of our lsas by flooding it at MaxAge. It leaves the
    /// database once every neighbor acknowledged the flush.
    pub(super) fn flush(&mut self, scope: Scope, lsa_id: &LsaIdentifier) {
        let Some(entry) = self.lsdb_mut(scope).and_then(|lsdb| lsdb.fetch_entry_mut(lsa_id)) else {
            return;
        };
        if entry.flushing {
            return;
        }
        entry.lsa.set_age(MaxAge);
        entry.flushing = true;
        let lsa = entry.lsa.clone();
        crate::util::debug(&format!("flushing {} from {}", lsa_id, scope));
        self.contents_withdrawn(scope, lsa_id);
        self.flood(scope, &lsa, None);
        self.stats.lsas_flushed += 1;
        self.release_max_age();
    }

    pub(super) fn flush_all_self_originated(&mut self) {
        self.wrapped.clear();
        let mut own = Vec::new();
        for scope in self.scopes() {
            let Some(lsdb) = self.lsdb(scope) else {
                continue;
            };
            own.extend(
                lsdb.iter()
                    .filter(|(lsa_id, entry)| {
                        lsa_id.advertising_router == self.router_id && !entry.flushing
                    })
                    .map(|(lsa_id, _)| (scope, lsa_id)),
            );
        }
        for (scope, lsa_id) in own {
            self.flush(scope, &lsa_id);
        }
    }

    /// Point-to-point links to full neighbors plus a stub link per up
    /// interface. The B bit is set while we are an ABR. An area we no
    /// longer have an up interface in gets its router-LSA flushed.
    pub(super) fn originate_router_lsas(&mut self) {
        let abr = self.is_abr();
        let area_ids: Vec<net::Ipv4Addr> = self.areas.keys().copied().collect();
        for area_id in area_ids {
            let mut link_states = Vec::new();
            for interface in self
                .interfaces
                .values()
                .filter(|interface| interface.up && interface.area_id == area_id)
            {
                for neighbor in self.neighbors.values().filter(|neighbor| {
                    neighbor.ifindex == interface.ifindex && neighbor.state == Status::Full
                }) {
                    link_states.push(LinkState::new(
                        LS_ID_POINT_TO_POINT,
                        ipv4_addr_to_bits(neighbor.id),
                        ipv4_addr_to_bits(interface.ip),
                        interface.output_cost,
                    ));
                }
                link_states.push(LinkState::new(
                    LS_ID_STUB,
                    interface.network(),
                    ipv4_addr_to_bits(interface.mask),
                    interface.output_cost,
                ));
            }
            let scope = Scope::Area(area_id);
            if link_states.is_empty() {
                let lsa_id = LsaIdentifier {
                    lsa_type: ROUTER_LSA_TYPE as u32,
                    link_state_id: self.router_id,
                    advertising_router: self.router_id,
                };
                self.flush(scope, &lsa_id);
                continue;
            }
            let body = LsaBody::Router(RouterLSA {
                veb: if abr { ROUTER_FLAG_B } else { 0 },
                link_states,
            });
            self.originate(scope, self.router_id, body);
        }
    }

    pub(super) fn own_opaque_id(&self, link_state_id: u32) -> LsaIdentifier {
        LsaIdentifier {
            lsa_type: OPAQUE_AS_LSA_TYPE as u32,
            link_state_id,
            advertising_router: self.router_id,
        }
    }
}
