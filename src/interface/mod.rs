use core::net;

use crate::config::InterfaceConfig;

/// # Interface
/// an ospf enabled interface as configured, plus its operational state
/// as reported by the interface state machine. Every interface is treated
/// as point-to-point.
#[derive(Clone, Debug)]
pub struct Interface {
    pub ifindex: u32,
    pub name: String,
    pub ip: net::Ipv4Addr,
    pub mask: net::Ipv4Addr,
    pub area_id: net::Ipv4Addr,
    pub output_cost: u16,
    pub up: bool,
}

impl Interface {
    pub fn from_config(config: &InterfaceConfig) -> Self {
        Self {
            ifindex: config.ifindex,
            name: config.name.clone(),
            ip: config.addr,
            mask: config.mask,
            area_id: config.area_id,
            output_cost: config.cost,
            up: false,
        }
    }
    pub fn network(&self) -> u32 {
        crate::util::ipv4_addr_to_bits(self.ip) & crate::util::ipv4_addr_to_bits(self.mask)
    }
    pub fn display(&self) -> String {
        format!(
            "{:>3} {:<8} {}/{} area {} cost {} {}",
            self.ifindex,
            self.name,
            self.ip,
            self.mask,
            self.area_id,
            self.output_cost,
            if self.up { "up" } else { "down" }
        )
    }
}
