use std::collections::{BTreeMap, BTreeSet};
use std::net;

pub mod lsdb;

use crate::lsa::opaque::OPAQUE_AS_LSA_TYPE;
use crate::rtable::{NextHop, Prefix, RouterRoute};

/// Where an lsa floods and which database holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Area(net::Ipv4Addr),
    As,
}

impl Scope {
    pub fn for_lsa_type(lsa_type: u8, area_id: net::Ipv4Addr) -> Self {
        if lsa_type == OPAQUE_AS_LSA_TYPE {
            Scope::As
        } else {
            Scope::Area(area_id)
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Area(area_id) => write!(f, "area {}", area_id),
            Scope::As => write!(f, "as"),
        }
    }
}

pub struct Area {
    pub id: net::Ipv4Addr,
    pub stub: bool,
    pub lsdb: lsdb::LsaDb,
    /// routers with the B bit reachable inside this area, from the last spf.
    pub abr_table: BTreeMap<u32, RouterRoute>,
    /// routers with the E bit reachable inside this area, from the last spf.
    pub asbr_table: BTreeMap<u32, RouterRoute>,
    /// intra-area networks from the last spf.
    pub networks: BTreeMap<Prefix, (u32, BTreeSet<NextHop>)>,
    pub spf_pending: bool,
}

impl Area {
    pub fn new(id: net::Ipv4Addr, stub: bool) -> Self {
        Self {
            id,
            stub,
            lsdb: lsdb::LsaDb::empty(),
            abr_table: BTreeMap::new(),
            asbr_table: BTreeMap::new(),
            networks: BTreeMap::new(),
            spf_pending: true,
        }
    }

    pub fn display(&self) -> String {
        format!(
            "area {}{}: {} lsas, {} abrs, {} asbrs",
            self.id,
            if self.stub { " (stub)" } else { "" },
            self.lsdb.len(),
            self.abr_table.len(),
            self.asbr_table.len()
        )
    }
}
