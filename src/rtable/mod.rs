use std::collections::{BTreeMap, BTreeSet};
use std::net;

use crate::lsa::LSInfinity;

pub mod graph;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Prefix {
    pub addr: u32,
    pub mask: u32,
}

impl Prefix {
    pub fn new(addr: u32, mask: u32) -> Self {
        Self {
            addr: addr & mask,
            mask,
        }
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            crate::util::bits_to_ipv4_addr(self.addr),
            self.mask.count_ones()
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Destination {
    Network(Prefix),
    Asbr(u32),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Network(prefix) => write!(f, "{}", prefix),
            Destination::Asbr(id) => write!(f, "asbr {}", crate::util::fmt_id(*id)),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum PathType {
    IntraArea,
    InterArea,
}

/// First hop of a path. `router` is zero on a directly attached network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NextHop {
    pub ifindex: Option<u32>,
    pub router: u32,
}

/// A router reached inside one area.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RouterRoute {
    pub cost: u32,
    pub next_hops: BTreeSet<NextHop>,
    pub veb: u8,
}

/// Best intra-area path to a destination over all attached areas.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IntraPath {
    pub area_id: net::Ipv4Addr,
    pub cost: u32,
    pub next_hops: BTreeSet<NextHop>,
}

#[derive(Clone, Debug)]
pub struct RouteTableEntry {
    pub destination: Destination,
    pub intra: Option<IntraPath>,
    pub path_type: Option<PathType>,
    pub cost: u32,
    pub area_id: Option<net::Ipv4Addr>,
    pub next_hops: BTreeSet<NextHop>,
    /// a summary carrying `cost` has been originated.
    pub advertised: bool,
    /// the path changed since the last advertisement decision.
    pub changed: bool,
    /// a Prefix-/ASBR-LSA describes this destination.
    pub sent_overlay: bool,
    /// opaque id of that Prefix-/ASBR-LSA.
    pub overlay_id: Option<u32>,
    /// intra-area cost carried by that lsa.
    pub overlay_metric: u32,
}

impl RouteTableEntry {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            intra: None,
            path_type: None,
            cost: LSInfinity,
            area_id: None,
            next_hops: BTreeSet::new(),
            advertised: false,
            changed: false,
            sent_overlay: false,
            overlay_id: None,
            overlay_metric: LSInfinity,
        }
    }
    pub fn display(&self) -> String {
        let path = match self.path_type {
            Some(PathType::IntraArea) => "intra",
            Some(PathType::InterArea) => "inter",
            None => "unreachable",
        };
        let hops: Vec<String> = self
            .next_hops
            .iter()
            .map(|hop| match hop.ifindex {
                Some(ifindex) => format!("{}@{}", crate::util::fmt_id(hop.router), ifindex),
                None => crate::util::fmt_id(hop.router),
            })
            .collect();
        format!(
            "{:<20} {:<11} cost {:<8} via [{}]{}{}",
            self.destination.to_string(),
            path,
            self.cost,
            hops.join(", "),
            if self.advertised { " adv" } else { "" },
            if self.sent_overlay { " overlay" } else { "" }
        )
    }
}

#[derive(Default)]
pub struct RouteTable {
    pub entries: BTreeMap<Destination, RouteTableEntry>,
    next_overlay_id: u32,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, destination: &Destination) -> Option<&RouteTableEntry> {
        self.entries.get(destination)
    }
    pub fn get_mut(&mut self, destination: &Destination) -> Option<&mut RouteTableEntry> {
        self.entries.get_mut(destination)
    }
    pub fn entry(&mut self, destination: Destination) -> &mut RouteTableEntry {
        self.entries
            .entry(destination)
            .or_insert_with(|| RouteTableEntry::new(destination))
    }
    pub fn destinations(&self) -> Vec<Destination> {
        self.entries.keys().copied().collect()
    }
    pub fn allocate_overlay_id(&mut self) -> u32 {
        self.next_overlay_id = (self.next_overlay_id + 1) & 0x00ff_ffff;
        if self.next_overlay_id == 0 {
            self.next_overlay_id = 1;
        }
        self.next_overlay_id
    }

    /// Replaces the intra-area part of every entry with `paths`. Entries that
    /// lose their intra path are flagged changed; entries left with nothing
    /// are dropped.
    pub fn update_intra(&mut self, paths: BTreeMap<Destination, IntraPath>) {
        for entry in self.entries.values_mut() {
            let new = paths.get(&entry.destination).cloned();
            if entry.intra != new {
                entry.changed = true;
                entry.intra = new;
            }
        }
        for (destination, path) in paths {
            let entry = self.entry(destination);
            if entry.intra.is_none() {
                entry.intra = Some(path);
                entry.changed = true;
            }
        }
        self.entries.retain(|_, entry| {
            entry.intra.is_some() || entry.advertised || entry.sent_overlay || entry.path_type.is_some()
        });
    }

    /// Selects the intra-area path for entries with no overlay candidate.
    pub fn apply_intra(entry: &mut RouteTableEntry) {
        match &entry.intra {
            Some(intra) => {
                entry.path_type = Some(PathType::IntraArea);
                entry.cost = intra.cost;
                entry.area_id = Some(intra.area_id);
                entry.next_hops = intra.next_hops.clone();
            }
            None => {
                entry.path_type = None;
                entry.cost = LSInfinity;
                entry.area_id = None;
                entry.next_hops.clear();
            }
        }
    }
}
