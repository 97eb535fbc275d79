//! Receiving, installing, flooding, acknowledging and aging lsas.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::net;

use crate::area::lsdb::{LsaHandle, LsaIdentifier};
use crate::area::Scope;
use crate::error::OspfError;
use crate::lsa::network::NETWORK_LSA_TYPE;
use crate::lsa::router::ROUTER_LSA_TYPE;
use crate::lsa::{self, Header, Lsa, LSRefreshTime, MaxAge, MaxSequenceNumber, MinLSArrival};
use crate::neighbor::status::Status;
use crate::packet::lsack::LsAck;
use crate::packet::lsu::Lsu;
use crate::packet::{Output, Packet};
use crate::timer::SECOND;
use crate::util::{fmt_id, ipv4_addr_to_bits};

use super::{Acceptance, Router};

impl Router {
    /// Handles one encoded lsa received from `neighbor` on `ifindex`.
    pub fn receive_lsa(
        &mut self,
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        data: &[u8],
    ) -> Result<Acceptance, OspfError> {
        self.check_sender(ifindex, neighbor)?;
        match Lsa::try_from_be_bytes(data) {
            Ok(lsa) => self.accept_lsa(ifindex, neighbor, lsa),
            Err(err) => Err(self.reject(ifindex, neighbor, err)),
        }
    }

    /// Handles a whole link state update packet. A malformed lsa inside the
    /// packet is rejected on its own; the others are still processed.
    pub fn receive_update(
        &mut self,
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        packet: &[u8],
    ) -> Result<Vec<Result<Acceptance, OspfError>>, OspfError> {
        self.check_sender(ifindex, neighbor)?;
        let (_, lsas) = Lsu::split(packet).map_err(|err| self.reject(ifindex, neighbor, err))?;
        let mut results = Vec::with_capacity(lsas.len());
        for lsa in lsas {
            results.push(match lsa {
                Ok(lsa) => self.accept_lsa(ifindex, neighbor, lsa),
                Err(err) => Err(self.reject(ifindex, neighbor, err)),
            });
        }
        Ok(results)
    }

    /// Handles acknowledged lsa headers. Returns how many retransmission list
    /// entries they released.
    pub fn receive_ack(
        &mut self,
        ifindex: u32,
        neighbor_id: net::Ipv4Addr,
        headers: &[Header],
    ) -> Result<usize, OspfError> {
        let area_id = self
            .interfaces
            .get(&ifindex)
            .ok_or(OspfError::UnknownInterface(ifindex))?
            .area_id;
        let neighbor = self
            .neighbors
            .get_mut(&(ifindex, neighbor_id))
            .ok_or(OspfError::UnknownNeighbor {
                ifindex,
                neighbor: neighbor_id,
            })?;
        let mut released = 0;
        for header in headers {
            let scope = Scope::for_lsa_type(header.lsa_type, area_id);
            if neighbor.acknowledge(scope, header) {
                released += 1;
            } else {
                crate::util::debug(&format!(
                    "ack from {} for {} matches nothing",
                    neighbor_id,
                    LsaIdentifier::from_header(header)
                ));
            }
        }
        if neighbor.retransmit_count() == 0 {
            self.timers.stop(neighbor.rxmt_timer);
        }
        self.release_max_age();
        Ok(released)
    }

    /// Acknowledged headers as concatenated 20-byte lsa headers.
    pub fn receive_ack_bytes(
        &mut self,
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        data: &[u8],
    ) -> Result<usize, OspfError> {
        if data.len() % Header::length() != 0 {
            return Err(OspfError::Truncated {
                needed: data.len().next_multiple_of(Header::length()),
                available: data.len(),
            });
        }
        let headers = data
            .chunks_exact(Header::length())
            .map(Header::try_from_be_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        self.receive_ack(ifindex, neighbor, &headers)
    }

    /// Handles a whole link state acknowledgment packet.
    pub fn receive_ack_packet(
        &mut self,
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        packet: &[u8],
    ) -> Result<usize, OspfError> {
        let ack = LsAck::try_from_be_bytes(packet)?;
        self.receive_ack(ifindex, neighbor, &ack.lsa_headers)
    }

    fn check_sender(&self, ifindex: u32, neighbor_id: net::Ipv4Addr) -> Result<(), OspfError> {
        if self.shutting_down {
            return Err(OspfError::ShuttingDown);
        }
        if !self.interfaces.contains_key(&ifindex) {
            return Err(OspfError::UnknownInterface(ifindex));
        }
        let neighbor = self
            .neighbors
            .get(&(ifindex, neighbor_id))
            .ok_or(OspfError::UnknownNeighbor {
                ifindex,
                neighbor: neighbor_id,
            })?;
        if !neighbor.state.is_exchanging() {
            return Err(OspfError::NeighborNotExchanging(neighbor_id));
        }
        Ok(())
    }

    fn reject(&mut self, ifindex: u32, neighbor: net::Ipv4Addr, err: OspfError) -> OspfError {
        self.stats.lsas_rejected += 1;
        let what = if err.is_malformed() { "malformed" } else { "refused" };
        crate::util::error(&format!(
            "{} lsa from {} on {}: {}",
            what, neighbor, ifindex, err
        ));
        err
    }

    fn any_neighbor_loading(&self) -> bool {
        self.neighbors
            .values()
            .any(|neighbor| matches!(neighbor.state, Status::Exchange | Status::Loading))
    }

    fn accept_lsa(
        &mut self,
        ifindex: u32,
        neighbor: net::Ipv4Addr,
        lsa: Lsa,
    ) -> Result<Acceptance, OspfError> {
        self.check_sender(ifindex, neighbor)?;
        self.stats.lsas_received += 1;
        let area_id = self
            .interfaces
            .get(&ifindex)
            .ok_or(OspfError::UnknownInterface(ifindex))?
            .area_id;
        let scope = Scope::for_lsa_type(lsa.header.lsa_type, area_id);
        if scope == Scope::As && self.areas.get(&area_id).is_some_and(|area| area.stub) {
            return Err(self.reject(ifindex, neighbor, OspfError::AsScopeInStubArea(area_id)));
        }
        let lsa_id = LsaIdentifier::from_header(&lsa.header);
        let now = self.timers.now();
        let stored = self
            .lsdb(scope)
            .and_then(|lsdb| lsdb.fetch_entry(&lsa_id))
            .map(|entry| (entry.lsa.header, entry.installed_at));

        if lsa.is_max_age() && stored.is_none() && !self.any_neighbor_loading() {
            self.send_ack(ifindex, neighbor, lsa.header);
            return Ok(Acceptance::Dropped);
        }

        let order = stored
            .map(|(header, _)| lsa::compare(&lsa.header, &header))
            .unwrap_or(Ordering::Greater);
        match order {
            Ordering::Greater => {
                if let Some((_, installed_at)) = stored {
                    if now.diff_millis(&installed_at) < (MinLSArrival * SECOND) as i64 {
                        crate::util::debug(&format!("{} arrived too soon", lsa_id));
                        return Ok(Acceptance::TooSoon);
                    }
                }
                self.remove_from_retransmit_lists(scope, &lsa_id);
                if lsa.header.advertising_router == self.router_id {
                    self.send_ack(ifindex, neighbor, lsa.header);
                    self.self_originated_received(scope, lsa);
                    return Ok(Acceptance::SelfOriginated);
                }
                let header = lsa.header;
                crate::util::debug(&format!(
                    "installing {} seq {:#010x} from {}",
                    lsa_id, header.sequence_number as u32, neighbor
                ));
                self.install(scope, lsa.clone(), false);
                let flooded = self.flood(scope, &lsa, Some((ifindex, neighbor)));
                self.send_ack(ifindex, neighbor, header);
                if header.is_max_age() {
                    self.release_max_age();
                }
                Ok(Acceptance::Installed { flooded })
            }
            Ordering::Equal => {
                let implied = self
                    .neighbors
                    .get_mut(&(ifindex, neighbor))
                    .map(|nbr| nbr.remove_retransmit(scope, &lsa_id))
                    .unwrap_or(false);
                if !implied {
                    self.send_ack(ifindex, neighbor, lsa.header);
                }
                Ok(Acceptance::Duplicate)
            }
            Ordering::Less => {
                let wrapping = stored
                    .map(|(header, _)| {
                        header.is_max_age() && header.sequence_number == MaxSequenceNumber
                    })
                    .unwrap_or(false);
                if !wrapping {
                    self.send_stored(ifindex, neighbor, scope, &lsa_id);
                }
                Ok(Acceptance::Older)
            }
        }
    }

    /// Someone holds a newer instance of one of our lsas, left over from
    /// before a restart. Still wanted: jump past its sequence number.
    /// Not wanted: install it and flush it.
    fn self_originated_received(&mut self, scope: Scope, lsa: Lsa) {
        let lsa_id = LsaIdentifier::from_header(&lsa.header);
        let current = self
            .lsdb(scope)
            .and_then(|lsdb| lsdb.fetch_entry(&lsa_id))
            .filter(|entry| entry.self_originated && !entry.flushing)
            .map(|entry| entry.lsa.body.clone());
        crate::util::log(&format!(
            "received newer instance of own {} seq {:#010x}",
            lsa_id, lsa.header.sequence_number as u32
        ));
        let sequence_number = lsa.header.sequence_number;
        // the network's instance is the one to supersede or flush
        self.install(scope, lsa, true);
        match current {
            Some(body) => {
                self.originate_after(scope, lsa_id, body, Some(sequence_number));
            }
            None => {
                self.flush(scope, &lsa_id);
                self.release_max_age();
            }
        }
    }

    /// Installs `lsa` and keeps the dependent indexes current: the overlay
    /// for AS-scope opaque lsas, the SPF pending flag for router and
    /// network lsas.
    pub(super) fn install(&mut self, scope: Scope, lsa: Lsa, self_originated: bool) -> Option<LsaHandle> {
        let lsa_id = LsaIdentifier::from_header(&lsa.header);
        let now = self.timers.now();
        let body = lsa.body.clone();
        let max_age = lsa.is_max_age();
        let lsa_type = lsa.header.lsa_type;
        let Some(lsdb) = self.lsdb_mut(scope) else {
            crate::util::error(&format!("no database for {}", scope));
            return None;
        };
        let (handle, _) = lsdb.install(lsa, now, self_originated);
        if max_age {
            if let Some(entry) = lsdb.get_mut(handle) {
                entry.flushing = true;
            }
        }
        match scope {
            Scope::Area(area_id) => {
                if lsa_type == ROUTER_LSA_TYPE || lsa_type == NETWORK_LSA_TYPE {
                    if let Some(area) = self.areas.get_mut(&area_id) {
                        area.spf_pending = true;
                    }
                    self.schedule_calculation();
                }
            }
            Scope::As => {
                match body.as_opaque() {
                    Some(opaque) if !max_age => self.overlay.link(lsa_id, handle, opaque),
                    _ => self.overlay.unlink(&lsa_id),
                }
                if self.overlay.changed {
                    self.schedule_calculation();
                }
            }
        }
        self.check_overflow();
        Some(handle)
    }

    /// A stored lsa stopped describing anything: it is MaxAge now.
    pub(super) fn contents_withdrawn(&mut self, scope: Scope, lsa_id: &LsaIdentifier) {
        match scope {
            Scope::Area(area_id) => {
                if lsa_id.lsa_type == ROUTER_LSA_TYPE as u32 || lsa_id.lsa_type == NETWORK_LSA_TYPE as u32 {
                    if let Some(area) = self.areas.get_mut(&area_id) {
                        area.spf_pending = true;
                    }
                    self.schedule_calculation();
                }
            }
            Scope::As => {
                self.overlay.unlink(lsa_id);
                if self.overlay.changed {
                    self.schedule_calculation();
                }
            }
        }
    }

    fn check_overflow(&mut self) {
        let Some(limit) = self.config.lsdb_limit else {
            return;
        };
        let count = self.as_lsdb.len() + self.areas.values().map(|area| area.lsdb.len()).sum::<usize>();
        if count > limit && !self.overflow {
            self.overflow = true;
            crate::util::error(&OspfError::LsdbOverflow { count, limit }.to_string());
        } else if count <= limit && self.overflow {
            self.overflow = false;
            crate::util::log(&format!("lsdb back under its limit ({} of {})", count, limit));
            // retry what was held back
            self.overlay.changed = true;
            self.schedule_calculation();
        }
    }

    /// Sends `lsa` to every adjacency in `scope` except the one it came from,
    /// and puts it on their retransmission lists. Returns the number of
    /// adjacencies it went to.
    pub(super) fn flood(
        &mut self,
        scope: Scope,
        lsa: &Lsa,
        from: Option<(u32, net::Ipv4Addr)>,
    ) -> usize {
        let targets: Vec<(u32, net::Ipv4Addr)> = self
            .neighbors
            .iter()
            .filter(|(key, neighbor)| {
                Some(**key) != from && neighbor.state.is_exchanging() && self.in_scope(key.0, scope)
            })
            .map(|(key, _)| *key)
            .collect();
        let rxmt_interval = self.config.rxmt_interval * SECOND;
        let mut ifindexes = BTreeSet::new();
        for key in &targets {
            let Some(neighbor) = self.neighbors.get_mut(key) else {
                continue;
            };
            neighbor.add_retransmit(scope, lsa.header);
            if !self.timers.is_running(neighbor.rxmt_timer) {
                self.timers.start(neighbor.rxmt_timer, rxmt_interval, true);
            }
            ifindexes.insert(key.0);
        }
        for ifindex in ifindexes {
            let area_id = self.area_bits(ifindex);
            self.outbox.push(Output {
                ifindex,
                destination: crate::AllSPFRouters,
                packet: Packet::Update(Lsu::new(self.router_id, area_id, vec![lsa.clone()])),
            });
        }
        targets.len()
    }

    fn in_scope(&self, ifindex: u32, scope: Scope) -> bool {
        let Some(interface) = self.interfaces.get(&ifindex).filter(|i| i.up) else {
            return false;
        };
        match scope {
            Scope::Area(area_id) => interface.area_id == area_id,
            Scope::As => !self
                .areas
                .get(&interface.area_id)
                .map(|area| area.stub)
                .unwrap_or(false),
        }
    }

    fn area_bits(&self, ifindex: u32) -> u32 {
        self.interfaces
            .get(&ifindex)
            .map(|interface| ipv4_addr_to_bits(interface.area_id))
            .unwrap_or(0)
    }

    fn remove_from_retransmit_lists(&mut self, scope: Scope, lsa_id: &LsaIdentifier) {
        for neighbor in self.neighbors.values_mut() {
            neighbor.remove_retransmit(scope, lsa_id);
        }
    }

    fn send_ack(&mut self, ifindex: u32, neighbor_id: net::Ipv4Addr, header: Header) {
        let Some(destination) = self
            .neighbors
            .get(&(ifindex, neighbor_id))
            .map(|neighbor| neighbor.ipv4_addr)
        else {
            return;
        };
        let area_id = self.area_bits(ifindex);
        self.outbox.push(Output {
            ifindex,
            destination,
            packet: Packet::Ack(LsAck::new(self.router_id, area_id, vec![header])),
        });
    }

    fn send_stored(
        &mut self,
        ifindex: u32,
        neighbor_id: net::Ipv4Addr,
        scope: Scope,
        lsa_id: &LsaIdentifier,
    ) {
        let Some(lsa) = self.lsdb(scope).and_then(|lsdb| lsdb.fetch_lsa(lsa_id)).cloned() else {
            return;
        };
        let Some(destination) = self
            .neighbors
            .get(&(ifindex, neighbor_id))
            .map(|neighbor| neighbor.ipv4_addr)
        else {
            return;
        };
        let area_id = self.area_bits(ifindex);
        self.outbox.push(Output {
            ifindex,
            destination,
            packet: Packet::Update(Lsu::new(self.router_id, area_id, vec![lsa])),
        });
    }

    /// Unacknowledged lsas go out again, unicast to the neighbor.
    pub(super) fn retransmit(&mut self, ifindex: u32, neighbor_id: net::Ipv4Addr) {
        let key = (ifindex, neighbor_id);
        let Some(neighbor) = self.neighbors.get(&key) else {
            return;
        };
        let mut lsas = Vec::new();
        let mut stale = Vec::new();
        for (scope, lsa_id) in neighbor.retransmit_list() {
            match self.lsdb(*scope).and_then(|lsdb| lsdb.fetch_lsa(lsa_id)) {
                Some(lsa) => lsas.push(lsa.clone()),
                None => stale.push((*scope, *lsa_id)),
            }
        }
        let destination = neighbor.ipv4_addr;
        let rxmt_timer = neighbor.rxmt_timer;
        if let Some(neighbor) = self.neighbors.get_mut(&key) {
            for (scope, lsa_id) in &stale {
                neighbor.remove_retransmit(*scope, lsa_id);
            }
        }
        if lsas.is_empty() {
            self.timers.stop(rxmt_timer);
            self.release_max_age();
            return;
        }
        crate::util::debug(&format!(
            "retransmitting {} lsa(s) to {}",
            lsas.len(),
            neighbor_id
        ));
        let area_id = self.area_bits(ifindex);
        // keep each update under the mtu
        let mut batch = Vec::new();
        let mut size = crate::packet::OSPF_PACKET_HEADER_LENGTH + 4;
        for lsa in lsas {
            if !batch.is_empty() && size + lsa.length() > crate::MTU {
                self.outbox.push(Output {
                    ifindex,
                    destination,
                    packet: Packet::Update(Lsu::new(self.router_id, area_id, std::mem::take(&mut batch))),
                });
                size = crate::packet::OSPF_PACKET_HEADER_LENGTH + 4;
            }
            size += lsa.length();
            batch.push(lsa);
        }
        self.outbox.push(Output {
            ifindex,
            destination,
            packet: Packet::Update(Lsu::new(self.router_id, area_id, batch)),
        });
    }

    /// Removes MaxAge lsas nobody still has to acknowledge, as long as no
    /// adjacency is in the middle of a database exchange. A wrapped lsa
    /// waiting on its flush is reoriginated from the initial sequence number.
    pub(super) fn release_max_age(&mut self) {
        if self.any_neighbor_loading() {
            return;
        }
        let mut removed = Vec::new();
        for scope in self.scopes() {
            let Some(lsdb) = self.lsdb(scope) else {
                continue;
            };
            for (lsa_id, entry) in lsdb.iter() {
                if !entry.lsa.is_max_age() {
                    continue;
                }
                let referenced = self
                    .neighbors
                    .values()
                    .any(|neighbor| neighbor.is_retransmitting(scope, &lsa_id));
                if !referenced {
                    removed.push((scope, lsa_id));
                }
            }
        }
        if removed.is_empty() {
            return;
        }
        for (scope, lsa_id) in removed {
            if let Some(lsdb) = self.lsdb_mut(scope) {
                lsdb.remove_lsa(&lsa_id);
            }
            crate::util::debug(&format!("removed MaxAge {} from {}", lsa_id, scope));
            self.contents_withdrawn(scope, &lsa_id);
            if let Some(body) = self.wrapped.remove(&(scope, lsa_id)) {
                crate::util::log(&format!(
                    "{} wrapped its sequence number, reoriginating",
                    lsa_id
                ));
                self.originate_after(scope, lsa_id, body, None);
            }
        }
        self.check_overflow();
    }

    /// The one second aging step. Own lsas are refreshed at LSRefreshTime;
    /// others are flushed on reaching MaxAge.
    pub(super) fn age_tick(&mut self) {
        let mut refresh = Vec::new();
        let mut expired = Vec::new();
        for scope in self.scopes() {
            let Some(lsdb) = self.lsdb_mut(scope) else {
                continue;
            };
            for lsa_id in lsdb.identifiers() {
                let Some(entry) = lsdb.fetch_entry_mut(&lsa_id) else {
                    continue;
                };
                if entry.lsa.is_max_age() {
                    continue;
                }
                let age = entry.lsa.header.age.saturating_add(1);
                entry.lsa.set_age(age);
                if entry.self_originated && !entry.flushing && age >= LSRefreshTime {
                    refresh.push((scope, lsa_id));
                } else if age >= MaxAge {
                    expired.push((scope, lsa_id));
                }
            }
        }
        for (scope, lsa_id) in refresh {
            self.refresh(scope, &lsa_id);
        }
        for (scope, lsa_id) in expired {
            self.expire(scope, &lsa_id);
        }
        self.release_max_age();
    }

    fn expire(&mut self, scope: Scope, lsa_id: &LsaIdentifier) {
        let Some(entry) = self.lsdb_mut(scope).and_then(|lsdb| lsdb.fetch_entry_mut(lsa_id)) else {
            return;
        };
        entry.flushing = true;
        let lsa = entry.lsa.clone();
        crate::util::debug(&format!(
            "{} from {} reached MaxAge",
            lsa_id,
            fmt_id(lsa_id.advertising_router)
        ));
        self.contents_withdrawn(scope, lsa_id);
        self.flood(scope, &lsa, None);
    }
}
