//! Overlay Dijkstra over the ABR-LSAs, next hop resolution, and the
//! best-path scan over Prefix-/ASBR-LSAs that decides what gets summarized.

use std::collections::{BTreeMap, BTreeSet};

use crate::area::lsdb::LsaDb;
use crate::lsa::LSInfinity;
use crate::rtable::{Destination, IntraPath, NextHop, PathType, RouteTable, RouteTableEntry};

use super::{NodeState, OverlayDb};

/// Outcome of the scan for one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteChange {
    /// originate or refresh the summaries carrying the new cost.
    Advertise(Destination),
    /// flush the summaries.
    Withdraw(Destination),
}

/// The winning instance for a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub cost: u32,
    pub advertising_router: u32,
}

impl OverlayDb {
    /// Shortest path tree over the ABR overlay rooted at `root`. Single path:
    /// an equal cost alternative never replaces the first parent found.
    /// Each ABR's links are read from its ABR-LSA in `lsdb`.
    pub fn overlay_dijkstra(&mut self, root: u32, lsdb: &LsaDb) {
        for node in self.abrs.values_mut() {
            node.cost = LSInfinity;
            node.tie = 0;
            node.state = NodeState::Uninit;
            node.parent = None;
            node.next_hop = None;
        }
        let Some(node) = self.abrs.get_mut(&root) else {
            crate::util::debug("overlay dijkstra: no ABR-LSA of our own yet");
            return;
        };
        let mut arrivals: u64 = 0;
        let mut candidates: BTreeSet<(u32, u32, u64, u32)> = BTreeSet::new();
        node.cost = 0;
        node.state = NodeState::OnCandidate;
        node.queued = arrivals;
        candidates.insert((0, 0, arrivals, root));

        while let Some((cost, _, _, router_id)) = candidates.pop_first() {
            let Some(node) = self.abrs.get_mut(&router_id) else {
                continue;
            };
            node.state = NodeState::OnTree;
            let Some(entries) = node.entries(lsdb) else {
                crate::util::error(&format!(
                    "overlay: abr-lsa of {} is no longer in the database",
                    crate::util::fmt_id(router_id)
                ));
                continue;
            };
            for entry in entries {
                let Some(neighbor) = self.abrs.get_mut(&entry.neighbor) else {
                    continue;
                };
                if neighbor.state == NodeState::OnTree {
                    continue;
                }
                let new_cost = cost.saturating_add(entry.metric as u32);
                if neighbor.state == NodeState::OnCandidate {
                    if new_cost >= neighbor.cost {
                        continue;
                    }
                    candidates.remove(&(neighbor.cost, neighbor.tie, neighbor.queued, neighbor.router_id));
                }
                arrivals += 1;
                neighbor.cost = new_cost;
                neighbor.tie = 0;
                neighbor.parent = Some(router_id);
                neighbor.state = NodeState::OnCandidate;
                neighbor.queued = arrivals;
                candidates.insert((new_cost, 0, arrivals, neighbor.router_id));
            }
        }
        self.set_overlay_nh(root);
    }

    /// For every ABR on the tree, the last node before the root on its
    /// parent chain becomes its next hop.
    pub fn set_overlay_nh(&mut self, root: u32) {
        let on_tree: Vec<u32> = self
            .abrs
            .values()
            .filter(|node| node.state == NodeState::OnTree && node.router_id != root)
            .map(|node| node.router_id)
            .collect();
        for router_id in on_tree {
            let mut current = router_id;
            let mut next_hop = None;
            for _ in 0..self.abrs.len() {
                match self.abrs.get(&current).and_then(|node| node.parent) {
                    Some(parent) if parent == root => {
                        next_hop = Some(current);
                        break;
                    }
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            if next_hop.is_none() {
                crate::util::error(&format!(
                    "overlay: broken parent chain for abr {}",
                    crate::util::fmt_id(router_id)
                ));
            }
            if let Some(node) = self.abrs.get_mut(&router_id) {
                node.next_hop = next_hop;
            }
        }
    }

    /// Overlay cost of `router_id` as seen from `root`, if it is on the tree.
    pub fn abr_cost(&self, root: u32, router_id: u32) -> Option<u32> {
        if router_id == root {
            return Some(0);
        }
        self.abrs
            .get(&router_id)
            .filter(|node| node.state == NodeState::OnTree)
            .map(|node| node.cost)
    }

    /// Strict minimum over every instance advertising `destination`. `intra`
    /// is our own intra-area path and competes first as if advertised by us;
    /// our own Prefix-/ASBR-LSAs are skipped in its favor.
    pub fn best_advertiser(
        &self,
        root: u32,
        destination: &Destination,
        intra: Option<&IntraPath>,
        lsdb: &LsaDb,
    ) -> Option<Selection> {
        let mut best = intra.map(|path| Selection {
            cost: path.cost,
            advertising_router: root,
        });
        for advertiser in self.advertisers(destination) {
            if advertiser.advertising_router == root {
                continue;
            }
            let Some(abr_cost) = self.abr_cost(root, advertiser.advertising_router) else {
                continue;
            };
            let Some(metric) = advertiser.metric(lsdb) else {
                crate::util::error(&format!(
                    "overlay: lsa of {} for {} is no longer in the database",
                    crate::util::fmt_id(advertiser.advertising_router),
                    destination
                ));
                continue;
            };
            let cost = abr_cost.saturating_add(metric);
            if cost >= LSInfinity {
                continue;
            }
            if best.map(|b| cost < b.cost).unwrap_or(true) {
                best = Some(Selection {
                    cost,
                    advertising_router: advertiser.advertising_router,
                });
            }
        }
        best
    }

    /// Walks every destination with an overlay or intra-area candidate and
    /// settles its routing table entry. `abr_paths` holds the intra-area path
    /// to each ABR reachable inside one of our areas.
    pub fn prefix_scan(
        &self,
        root: u32,
        rtable: &mut RouteTable,
        abr_paths: &BTreeMap<u32, IntraPath>,
        lsdb: &LsaDb,
    ) -> Vec<RouteChange> {
        let mut destinations: BTreeSet<Destination> = rtable.destinations().into_iter().collect();
        destinations.extend(self.destinations.keys().copied());

        let mut changes = Vec::new();
        for destination in destinations {
            let entry = rtable.entry(destination);
            match self.best_advertiser(root, &destination, entry.intra.as_ref(), lsdb) {
                Some(selection) => {
                    let Some(path) = self.resolve_path(root, entry, selection, abr_paths) else {
                        continue;
                    };
                    if entry.cost != selection.cost || entry.changed || !entry.advertised {
                        entry.cost = selection.cost;
                        entry.path_type = Some(path.0);
                        entry.area_id = Some(path.1);
                        entry.next_hops = path.2;
                        entry.advertised = true;
                        entry.changed = false;
                        changes.push(RouteChange::Advertise(destination));
                    } else {
                        entry.path_type = Some(path.0);
                        entry.area_id = Some(path.1);
                        entry.next_hops = path.2;
                    }
                }
                None => {
                    let was_advertised = entry.advertised;
                    entry.advertised = false;
                    entry.changed = false;
                    RouteTable::apply_intra(entry);
                    if was_advertised {
                        changes.push(RouteChange::Withdraw(destination));
                    }
                }
            }
        }
        rtable.entries.retain(|_, entry| {
            entry.intra.is_some() || entry.advertised || entry.sent_overlay || entry.path_type.is_some()
        });
        changes
    }

    fn resolve_path(
        &self,
        root: u32,
        entry: &RouteTableEntry,
        selection: Selection,
        abr_paths: &BTreeMap<u32, IntraPath>,
    ) -> Option<(PathType, std::net::Ipv4Addr, BTreeSet<NextHop>)> {
        if selection.advertising_router == root {
            let intra = entry.intra.as_ref()?;
            return Some((PathType::IntraArea, intra.area_id, intra.next_hops.clone()));
        }
        let next_hop = self
            .abrs
            .get(&selection.advertising_router)
            .and_then(|node| node.next_hop);
        let path = next_hop.and_then(|next_hop| abr_paths.get(&next_hop));
        match path {
            Some(path) => Some((PathType::InterArea, path.area_id, path.next_hops.clone())),
            None => {
                crate::util::error(&format!(
                    "overlay: no intra-area path towards next hop of {} for {}",
                    crate::util::fmt_id(selection.advertising_router),
                    entry.destination
                ));
                None
            }
        }
    }
}
