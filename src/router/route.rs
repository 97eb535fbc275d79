//! The routing calculation: intra-area SPF, the overlay lsas this router
//! owes the network, the overlay Dijkstra and the summaries that follow
//! from the chosen paths.

use std::collections::BTreeMap;
use std::net;

use crate::area::Scope;
use crate::interface::Interface;
use crate::lsa::opaque::{opaque_lsid, OpaqueLSA, OPQ_T_MULTI_ABR, OPQ_T_MULTI_ASBR, OPQ_T_MULTI_PREFIX};
use crate::lsa::summary::{SummaryLSA, SUMMARY_LSA_TYPE_3, SUMMARY_LSA_TYPE_4};
use crate::lsa::{LSInfinity, LsaBody};
use crate::area::lsdb::LsaIdentifier;
use crate::overlay::calc::RouteChange;
use crate::overlay::lsas::{build_abr_lsa, destination_body, nb_max_state_achieved, pending_updates, OverlayUpdate};
use crate::rtable::graph::shortest_path_tree;
use crate::rtable::{Destination, IntraPath, RouteTable};

use super::Router;

impl Router {
    /// Brings the routing table up to date. Runs from the SPF timer; calling
    /// it directly is fine too.
    pub fn run_calculations(&mut self) {
        if self.shutting_down {
            return;
        }
        self.timers.stop(self.spf_timer);
        let intra_changed = self.intra_area_spf();
        if self.is_abr() {
            self.update_overlay_lsas();
            if intra_changed || self.overlay.changed {
                self.overlay_calc();
            }
        } else {
            self.intra_area_only();
        }
    }

    /// SPF over every area whose topology changed. Returns whether any ran.
    fn intra_area_spf(&mut self) -> bool {
        let pending: Vec<net::Ipv4Addr> = self
            .areas
            .values()
            .filter(|area| area.spf_pending)
            .map(|area| area.id)
            .collect();
        if pending.is_empty() {
            return false;
        }
        for area_id in pending {
            let interfaces: Vec<Interface> = self
                .interfaces
                .values()
                .filter(|interface| interface.up && interface.area_id == area_id)
                .cloned()
                .collect();
            let Some(area) = self.areas.get_mut(&area_id) else {
                continue;
            };
            let result = shortest_path_tree(self.router_id, &area.lsdb, &interfaces);
            area.abr_table = result.abrs();
            area.asbr_table = result.asbrs();
            area.networks = result.networks;
            area.spf_pending = false;
            self.stats.spf_runs += 1;
            crate::util::debug(&format!(
                "spf in area {}: {} network(s), {} abr(s), {} asbr(s)",
                area_id,
                area.networks.len(),
                area.abr_table.len(),
                area.asbr_table.len()
            ));
        }
        let paths = self.intra_paths();
        self.rtable.update_intra(paths);
        true
    }

    /// Cheapest intra-area path to every network and ASBR over all areas;
    /// equal costs keep the lower area id.
    fn intra_paths(&self) -> BTreeMap<Destination, IntraPath> {
        let mut paths: BTreeMap<Destination, IntraPath> = BTreeMap::new();
        let mut offer = |destination: Destination, path: IntraPath| {
            match paths.get(&destination) {
                Some(best) if best.cost <= path.cost => {}
                _ => {
                    paths.insert(destination, path);
                }
            }
        };
        for area in self.areas.values() {
            for (prefix, (cost, next_hops)) in &area.networks {
                offer(
                    Destination::Network(*prefix),
                    IntraPath {
                        area_id: area.id,
                        cost: *cost,
                        next_hops: next_hops.clone(),
                    },
                );
            }
            for (router_id, route) in &area.asbr_table {
                if *router_id == self.router_id {
                    continue;
                }
                offer(
                    Destination::Asbr(*router_id),
                    IntraPath {
                        area_id: area.id,
                        cost: route.cost,
                        next_hops: route.next_hops.clone(),
                    },
                );
            }
        }
        paths
    }

    /// Intra-area path to every ABR seen in one of our areas, cheapest first.
    fn abr_paths(&self) -> BTreeMap<u32, IntraPath> {
        let mut paths: BTreeMap<u32, IntraPath> = BTreeMap::new();
        for area in self.areas.values() {
            for (router_id, route) in &area.abr_table {
                match paths.get(router_id) {
                    Some(best) if best.cost <= route.cost => {}
                    _ => {
                        paths.insert(
                            *router_id,
                            IntraPath {
                                area_id: area.id,
                                cost: route.cost,
                                next_hops: route.next_hops.clone(),
                            },
                        );
                    }
                }
            }
        }
        paths
    }

    /// The first ABR-, Prefix- and ASBR-LSAs go out only once every adjacency
    /// has settled; after that they track the intra-area state.
    fn update_overlay_lsas(&mut self) {
        if !self.first_overlay_lsas_sent {
            if !nb_max_state_achieved(self.neighbors.values()) {
                crate::util::debug("overlay: waiting for adjacencies to settle");
                return;
            }
            crate::util::log("overlay: sending first overlay lsas");
            self.first_overlay_lsas_sent = true;
        }
        let abr_lsa = build_abr_lsa(self.areas.values(), self.router_id);
        self.originate(
            Scope::As,
            opaque_lsid(OPQ_T_MULTI_ABR, 0),
            LsaBody::Opaque(OpaqueLSA::Abr(abr_lsa)),
        );
        for update in pending_updates(&self.rtable) {
            match update {
                OverlayUpdate::Originate(destination, cost) => {
                    if self.overflow {
                        continue;
                    }
                    self.originate_overlay(destination, cost);
                }
                OverlayUpdate::Flush(destination) => self.flush_overlay(&destination),
            }
        }
    }

    fn overlay_lsid(destination: &Destination, overlay_id: u32) -> u32 {
        match destination {
            Destination::Network(_) => opaque_lsid(OPQ_T_MULTI_PREFIX, overlay_id),
            Destination::Asbr(_) => opaque_lsid(OPQ_T_MULTI_ASBR, overlay_id),
        }
    }

    fn originate_overlay(&mut self, destination: Destination, cost: u32) {
        let overlay_id = match self.rtable.get(&destination).and_then(|entry| entry.overlay_id) {
            Some(overlay_id) => overlay_id,
            None => self.rtable.allocate_overlay_id(),
        };
        let body = LsaBody::Opaque(destination_body(&destination, cost));
        self.originate(Scope::As, Self::overlay_lsid(&destination, overlay_id), body);
        let entry = self.rtable.entry(destination);
        entry.sent_overlay = true;
        entry.overlay_id = Some(overlay_id);
        entry.overlay_metric = cost;
    }

    fn flush_overlay(&mut self, destination: &Destination) {
        let Some(entry) = self.rtable.get_mut(destination) else {
            return;
        };
        let overlay_id = entry.overlay_id.take();
        entry.sent_overlay = false;
        entry.overlay_metric = LSInfinity;
        if let Some(overlay_id) = overlay_id {
            let lsa_id = self.own_opaque_id(Self::overlay_lsid(destination, overlay_id));
            self.flush(Scope::As, &lsa_id);
        }
    }

    /// Overlay Dijkstra from ourselves, then best-path selection for every
    /// destination and the Summary-LSAs that follow from it.
    fn overlay_calc(&mut self) {
        self.overlay.overlay_dijkstra(self.router_id, &self.as_lsdb);
        self.stats.overlay_dijkstras += 1;
        let abr_paths = self.abr_paths();
        let changes = self
            .overlay
            .prefix_scan(self.router_id, &mut self.rtable, &abr_paths, &self.as_lsdb);
        self.overlay.changed = false;
        for change in changes {
            match change {
                RouteChange::Advertise(destination) => self.advertise_summaries(destination),
                RouteChange::Withdraw(destination) => self.withdraw_summaries(&destination),
            }
        }
    }

    fn summary_for(&self, destination: &Destination, cost: u32) -> (u32, LsaBody) {
        match destination {
            Destination::Network(prefix) => (
                prefix.addr,
                LsaBody::SummaryNetwork(SummaryLSA {
                    network_mask: prefix.mask,
                    metric: cost,
                }),
            ),
            Destination::Asbr(router_id) => (
                *router_id,
                LsaBody::SummaryRouter(SummaryLSA {
                    network_mask: 0,
                    metric: cost,
                }),
            ),
        }
    }

    fn summary_id(&self, destination: &Destination) -> LsaIdentifier {
        let (lsa_type, link_state_id) = match destination {
            Destination::Network(prefix) => (SUMMARY_LSA_TYPE_3, prefix.addr),
            Destination::Asbr(router_id) => (SUMMARY_LSA_TYPE_4, *router_id),
        };
        LsaIdentifier {
            lsa_type: lsa_type as u32,
            link_state_id,
            advertising_router: self.router_id,
        }
    }

    /// Summarizes the selected path into every attached area except the one
    /// the path leaves through. Stub areas get no type 4 summaries.
    fn advertise_summaries(&mut self, destination: Destination) {
        let Some(entry) = self.rtable.get_mut(&destination) else {
            return;
        };
        let (cost, path_area) = (entry.cost, entry.area_id);
        if cost >= LSInfinity {
            self.withdraw_summaries(&destination);
            return;
        }
        if self.overflow {
            // retried once the database drops under its limit
            entry.advertised = false;
            return;
        }
        let (link_state_id, body) = self.summary_for(&destination, cost);
        let lsa_id = self.summary_id(&destination);
        let is_asbr = matches!(destination, Destination::Asbr(_));
        let attached: Vec<(net::Ipv4Addr, bool)> = self
            .areas
            .values()
            .filter(|area| {
                self.interfaces
                    .values()
                    .any(|interface| interface.up && interface.area_id == area.id)
            })
            .map(|area| (area.id, area.stub))
            .collect();
        crate::util::debug(&format!("advertising {} at cost {}", destination, cost));
        for area_id in self.areas.keys().copied().collect::<Vec<_>>() {
            let scope = Scope::Area(area_id);
            let wanted = attached
                .iter()
                .any(|(id, stub)| *id == area_id && !(*stub && is_asbr))
                && Some(area_id) != path_area;
            if wanted {
                self.originate(scope, link_state_id, body.clone());
            } else {
                self.flush(scope, &lsa_id);
            }
        }
    }

    fn withdraw_summaries(&mut self, destination: &Destination) {
        crate::util::debug(&format!("withdrawing {}", destination));
        let lsa_id = self.summary_id(destination);
        for area_id in self.areas.keys().copied().collect::<Vec<_>>() {
            self.flush(Scope::Area(area_id), &lsa_id);
        }
    }

    /// Without a second area there is nothing to summarize: routes come
    /// straight from the intra-area paths and anything we advertised or put
    /// into the overlay as an ABR is withdrawn.
    fn intra_area_only(&mut self) {
        if self.first_overlay_lsas_sent {
            crate::util::log("overlay: no longer an ABR, withdrawing overlay lsas");
            let lsa_id = self.own_opaque_id(opaque_lsid(OPQ_T_MULTI_ABR, 0));
            self.flush(Scope::As, &lsa_id);
            self.first_overlay_lsas_sent = false;
        }
        for destination in self.rtable.destinations() {
            let (advertised, sent_overlay) = match self.rtable.get(&destination) {
                Some(entry) => (entry.advertised, entry.sent_overlay),
                None => continue,
            };
            if advertised {
                self.withdraw_summaries(&destination);
            }
            if sent_overlay {
                self.flush_overlay(&destination);
            }
            if let Some(entry) = self.rtable.get_mut(&destination) {
                entry.advertised = false;
                entry.changed = false;
                RouteTable::apply_intra(entry);
            }
        }
        self.rtable.entries.retain(|_, entry| entry.intra.is_some());
    }
}
