//! Typed configuration records consumed by the router.
//!
//! How the records are produced (command line, file, anything else) is not
//! this crate's concern; the router only ever sees validated values.

use std::collections::BTreeSet;
use std::net;

use crate::error::OspfError;

pub const DEFAULT_RXMT_INTERVAL: u32 = 5;
pub const DEFAULT_SPF_DELAY_MS: u32 = 200;
pub const DEFAULT_SHUTDOWN_WAIT: u32 = 10;
pub const BACKBONE: net::Ipv4Addr = net::Ipv4Addr::UNSPECIFIED;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AreaConfig {
    pub id: net::Ipv4Addr,
    pub stub: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub ifindex: u32,
    pub name: String,
    pub addr: net::Ipv4Addr,
    pub mask: net::Ipv4Addr,
    pub area_id: net::Ipv4Addr,
    pub cost: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub router_id: net::Ipv4Addr,
    pub areas: Vec<AreaConfig>,
    pub interfaces: Vec<InterfaceConfig>,
    /// upper bound on stored lsas before the router enters overflow state.
    pub lsdb_limit: Option<usize>,
    /// seconds between retransmissions of unacknowledged lsas.
    pub rxmt_interval: u32,
    /// hold-down between an lsdb change and the route calculation it triggers.
    pub spf_delay_ms: u32,
    /// seconds to wait for flushes to be acknowledged on shutdown.
    pub shutdown_wait: u32,
    /// seed for timer jitter.
    pub random_seed: u64,
}

impl RouterConfig {
    pub fn new(router_id: net::Ipv4Addr) -> Self {
        Self {
            router_id,
            areas: Vec::new(),
            interfaces: Vec::new(),
            lsdb_limit: None,
            rxmt_interval: DEFAULT_RXMT_INTERVAL,
            spf_delay_ms: DEFAULT_SPF_DELAY_MS,
            shutdown_wait: DEFAULT_SHUTDOWN_WAIT,
            random_seed: crate::util::ipv4_addr_to_bits(router_id) as u64,
        }
    }

    pub fn with_area(mut self, id: net::Ipv4Addr) -> Self {
        if !self.areas.iter().any(|area| area.id == id) {
            self.areas.push(AreaConfig { id, stub: false });
        }
        self
    }

    /// Adds an interface, creating its area on the fly.
    pub fn with_interface(mut self, interface: InterfaceConfig) -> Self {
        self = self.with_area(interface.area_id);
        self.interfaces.push(interface);
        self
    }

    pub fn with_lsdb_limit(mut self, limit: usize) -> Self {
        self.lsdb_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), OspfError> {
        if self.router_id.is_unspecified() {
            return Err(OspfError::InvalidConfig("router id 0.0.0.0".to_string()));
        }
        let areas: BTreeSet<_> = self.areas.iter().map(|area| area.id).collect();
        if areas.len() != self.areas.len() {
            return Err(OspfError::InvalidConfig("duplicate area".to_string()));
        }
        let mut seen = BTreeSet::new();
        for interface in &self.interfaces {
            if !seen.insert(interface.ifindex) {
                return Err(OspfError::InvalidConfig(format!(
                    "duplicate ifindex {}",
                    interface.ifindex
                )));
            }
            if !areas.contains(&interface.area_id) {
                return Err(OspfError::InvalidConfig(format!(
                    "interface {} references unconfigured area {}",
                    interface.name, interface.area_id
                )));
            }
            if interface.cost == 0 {
                return Err(OspfError::InvalidConfig(format!(
                    "interface {} has cost 0",
                    interface.name
                )));
            }
        }
        if self.rxmt_interval == 0 {
            return Err(OspfError::InvalidConfig("rxmt interval 0".to_string()));
        }
        Ok(())
    }

    pub fn interface(&self, ifindex: u32) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.ifindex == ifindex)
    }
}

impl InterfaceConfig {
    pub fn new(ifindex: u32, name: &str, addr: net::Ipv4Addr, prefix_len: u8, area_id: net::Ipv4Addr, cost: u16) -> Self {
        Self {
            ifindex,
            name: name.to_string(),
            addr,
            mask: crate::util::bits_to_ipv4_addr(crate::util::prefix_len_to_mask(prefix_len)),
            area_id,
            cost,
        }
    }
}

/// Parses `IFINDEX,NAME,ADDR/PREFIXLEN,AREA,COST`.
impl std::str::FromStr for InterfaceConfig {
    type Err = OspfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OspfError::InvalidConfig(format!("bad interface spec '{}'", s));
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        let [ifindex, name, prefix, area, cost] = fields.as_slice() else {
            return Err(invalid());
        };
        let (addr, prefix_len) = prefix.split_once('/').ok_or_else(invalid)?;
        let prefix_len: u8 = prefix_len.parse().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }
        Ok(Self::new(
            ifindex.parse().map_err(|_| invalid())?,
            name,
            addr.parse().map_err(|_| invalid())?,
            prefix_len,
            area.parse().map_err(|_| invalid())?,
            cost.parse().map_err(|_| invalid())?,
        ))
    }
}
