use std::net;

pub mod area;
pub mod config;
pub mod error;
pub mod interface;
pub mod lsa;
pub mod neighbor;
pub mod overlay;
pub mod packet;
pub mod router;
pub mod rtable;
pub mod timer;
pub mod util;

pub use error::OspfError;
pub use router::Router;

#[allow(non_upper_case_globals)]
pub const AllSPFRouters: net::Ipv4Addr = util::bits_to_ipv4_addr(0xe0000005);

pub const OSPF_VERSION_2: u8 = 2;
pub const MTU: usize = 1500;
