//! The ABR overlay: an index over the overlay opaque lsas held in the AS
//! database, kept in step with it by `link`/`unlink`, plus the per-calculation
//! working state of every ABR node.

use std::collections::BTreeMap;

use crate::area::lsdb::{LsaDb, LsaHandle, LsaIdentifier};
use crate::lsa::opaque::{AbrEntry, OpaqueLSA};
use crate::lsa::{LSInfinity, Lsa, LsaBody};
use crate::rtable::{Destination, Prefix};

pub mod calc;
pub mod lsas;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Uninit,
    OnCandidate,
    OnTree,
}

/// One ABR, described by the ABR-LSA behind `lsa`.
#[derive(Clone, Debug)]
pub struct AbrNode {
    pub router_id: u32,
    pub lsa: LsaHandle,
    pub cost: u32,
    /// secondary tie-break, reserved; always zero.
    pub tie: u32,
    pub state: NodeState,
    pub parent: Option<u32>,
    /// the overlay neighbor of the root this ABR is reached through.
    pub next_hop: Option<u32>,
    queued: u64,
}

impl AbrNode {
    fn new(router_id: u32, lsa: LsaHandle) -> Self {
        Self {
            router_id,
            lsa,
            cost: LSInfinity,
            tie: 0,
            state: NodeState::Uninit,
            parent: None,
            next_hop: None,
            queued: 0,
        }
    }
    /// The overlay links this ABR advertises, read from the database.
    /// `None` once the handle went stale or the lsa reached MaxAge.
    pub fn entries<'a>(&self, lsdb: &'a LsaDb) -> Option<&'a [AbrEntry]> {
        match &live_lsa(lsdb, self.lsa)?.body {
            LsaBody::Opaque(OpaqueLSA::Abr(abr)) => Some(&abr.entries),
            _ => None,
        }
    }

    pub fn display(&self, lsdb: &LsaDb) -> String {
        let state = match self.state {
            NodeState::Uninit => "uninit",
            NodeState::OnCandidate => "candidate",
            NodeState::OnTree => "on tree",
        };
        let neighbors: Vec<String> = self
            .entries(lsdb)
            .unwrap_or_default()
            .iter()
            .map(|entry| format!("{}:{}", crate::util::fmt_id(entry.neighbor), entry.metric))
            .collect();
        format!(
            "abr {:<15} {:<9} cost {:<8} parent {:<15} nh {:<15} [{}]",
            crate::util::fmt_id(self.router_id),
            state,
            self.cost,
            self.parent.map(crate::util::fmt_id).unwrap_or_else(|| "-".into()),
            self.next_hop.map(crate::util::fmt_id).unwrap_or_else(|| "-".into()),
            neighbors.join(" ")
        )
    }
}

/// A Prefix-LSA or ASBR-LSA instance advertising a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayRef {
    pub lsa: LsaHandle,
    pub advertising_router: u32,
}

impl OverlayRef {
    /// the advertised metric, read from the database.
    pub fn metric(&self, lsdb: &LsaDb) -> Option<u32> {
        match &live_lsa(lsdb, self.lsa)?.body {
            LsaBody::Opaque(OpaqueLSA::Prefix(prefix)) => Some(prefix.metric),
            LsaBody::Opaque(OpaqueLSA::Asbr(asbr)) => Some(asbr.metric),
            _ => None,
        }
    }
}

fn live_lsa(lsdb: &LsaDb, handle: LsaHandle) -> Option<&Lsa> {
    lsdb.get(handle)
        .map(|entry| &entry.lsa)
        .filter(|lsa| !lsa.is_max_age())
}

#[derive(Default)]
pub struct OverlayDb {
    pub abrs: BTreeMap<u32, AbrNode>,
    pub destinations: BTreeMap<Destination, BTreeMap<LsaIdentifier, OverlayRef>>,
    /// `None` for ABR-LSAs.
    linked: BTreeMap<LsaIdentifier, Option<Destination>>,
    /// set whenever the index changes; cleared by the caller after a calculation.
    pub changed: bool,
}

impl OverlayDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes an installed overlay lsa. A previous instance under the same
    /// key is replaced.
    pub fn link(&mut self, lsa_id: LsaIdentifier, handle: LsaHandle, body: &OpaqueLSA) {
        self.unlink(&lsa_id);
        let advertising_router = lsa_id.advertising_router;
        let destination = match body {
            OpaqueLSA::Abr(_) => {
                self.abrs
                    .insert(advertising_router, AbrNode::new(advertising_router, handle));
                self.linked.insert(lsa_id, None);
                self.changed = true;
                return;
            }
            OpaqueLSA::Prefix(prefix) => {
                Destination::Network(Prefix::new(prefix.subnet_addr, prefix.subnet_mask))
            }
            OpaqueLSA::Asbr(asbr) => Destination::Asbr(asbr.dest_router),
            OpaqueLSA::Generic(_) => return,
        };
        self.destinations.entry(destination).or_default().insert(
            lsa_id,
            OverlayRef {
                lsa: handle,
                advertising_router,
            },
        );
        self.linked.insert(lsa_id, Some(destination));
        self.changed = true;
    }

    /// Drops whatever `lsa_id` contributed to the index.
    pub fn unlink(&mut self, lsa_id: &LsaIdentifier) {
        let Some(destination) = self.linked.remove(lsa_id) else {
            return;
        };
        self.changed = true;
        let Some(destination) = destination else {
            self.abrs.remove(&lsa_id.advertising_router);
            return;
        };
        if let Some(refs) = self.destinations.get_mut(&destination) {
            refs.remove(lsa_id);
            if refs.is_empty() {
                self.destinations.remove(&destination);
            }
        }
    }

    pub fn advertisers(&self, destination: &Destination) -> impl Iterator<Item = &OverlayRef> + '_ {
        self.destinations.get(destination).into_iter().flat_map(|refs| refs.values())
    }

    pub fn display(&self, lsdb: &LsaDb) -> String {
        let mut lines: Vec<String> = self.abrs.values().map(|node| node.display(lsdb)).collect();
        for (destination, refs) in &self.destinations {
            let advertisers: Vec<String> = refs
                .values()
                .map(|r| {
                    let metric = r.metric(lsdb).map(|m| m.to_string()).unwrap_or_else(|| "?".into());
                    format!("{}:{}", crate::util::fmt_id(r.advertising_router), metric)
                })
                .collect();
            lines.push(format!("{:<20} [{}]", destination.to_string(), advertisers.join(" ")));
        }
        lines.join("\n")
    }
}
