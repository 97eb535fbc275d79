//! Building this router's own overlay lsas.

use std::collections::BTreeMap;

use crate::area::Area;
use crate::lsa::opaque::{AbrEntry, AbrLSA, AsbrLSA, OpaqueLSA, PrefixLSA, ABR_METRIC_MAX};
use crate::neighbor::Neighbor;
use crate::rtable::{Destination, RouteTable};

/// Whether every adjacency on every interface has reached 2-Way or Full.
/// Routers with no neighbors at all have nothing to wait for.
pub fn nb_max_state_achieved<'a>(neighbors: impl IntoIterator<Item = &'a Neighbor>) -> bool {
    neighbors
        .into_iter()
        .all(|neighbor| neighbor.state.is_terminal())
}

/// One entry per ABR reachable in any of our areas, at the cheapest intra-area
/// cost over all areas, ordered by router id, ourselves excluded. Costs wider
/// than the 8-bit metric field saturate at ABR_METRIC_MAX.
pub fn build_abr_lsa<'a>(areas: impl IntoIterator<Item = &'a Area>, router_id: u32) -> AbrLSA {
    let mut best: BTreeMap<u32, u32> = BTreeMap::new();
    for area in areas {
        for (abr, route) in &area.abr_table {
            if *abr == router_id {
                continue;
            }
            best.entry(*abr)
                .and_modify(|cost| *cost = (*cost).min(route.cost))
                .or_insert(route.cost);
        }
    }
    AbrLSA {
        entries: best
            .into_iter()
            .map(|(neighbor, cost)| {
                if cost > ABR_METRIC_MAX {
                    crate::util::debug(&format!(
                        "abr {} cost {} saturates the abr-lsa metric at {}",
                        crate::util::fmt_id(neighbor),
                        cost,
                        ABR_METRIC_MAX
                    ));
                }
                AbrEntry {
                    neighbor,
                    metric: AbrLSA::clamp_metric(cost),
                }
            })
            .collect(),
    }
}

/// The Prefix-LSA or ASBR-LSA body describing `destination` at `cost`.
pub fn destination_body(destination: &Destination, cost: u32) -> OpaqueLSA {
    match destination {
        Destination::Network(prefix) => OpaqueLSA::Prefix(PrefixLSA {
            subnet_mask: prefix.mask,
            subnet_addr: prefix.addr,
            metric: cost,
        }),
        Destination::Asbr(router_id) => OpaqueLSA::Asbr(AsbrLSA {
            dest_router: *router_id,
            metric: cost,
        }),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayUpdate {
    /// (re)originate the Prefix-/ASBR-LSA carrying this intra-area cost.
    Originate(Destination, u32),
    Flush(Destination),
}

/// Prefix-/ASBR-LSAs to send so the overlay matches the intra-area routes:
/// new intra-area destinations, changed intra-area costs, and destinations
/// no longer reachable inside any of our areas.
pub fn pending_updates(rtable: &RouteTable) -> Vec<OverlayUpdate> {
    rtable
        .entries
        .values()
        .filter_map(|entry| match (&entry.intra, entry.sent_overlay) {
            (Some(intra), false) => Some(OverlayUpdate::Originate(entry.destination, intra.cost)),
            (Some(intra), true) if intra.cost != entry.overlay_metric => {
                Some(OverlayUpdate::Originate(entry.destination, intra.cost))
            }
            (None, true) => Some(OverlayUpdate::Flush(entry.destination)),
            _ => None,
        })
        .collect()
}
