use colored::*;
use std::net;

pub fn debug(msg: &str) {
    if cfg!(feature = "debug") {
        println!("{}", format!("[debug]:{}", msg).yellow());
    }
}

pub fn log(msg: &str) {
    if cfg!(feature = "log") {
        println!("{}", format!("[log]:{}", msg).green());
    }
}

pub fn error(msg: &str) {
    println!("{}", format!("[error]:{}", msg).red());
}

pub const fn bits_to_ipv4_addr(bits: u32) -> net::Ipv4Addr {
    net::Ipv4Addr::new(
        ((bits >> 24) & 0xff) as u8,
        ((bits >> 16) & 0xff) as u8,
        ((bits >> 8) & 0xff) as u8,
        (bits & 0xff) as u8,
    )
}

pub const fn ipv4_addr_to_bits(ip: net::Ipv4Addr) -> u32 {
    (ip.octets()[0] as u32) << 24
        | (ip.octets()[1] as u32) << 16
        | (ip.octets()[2] as u32) << 8
        | ip.octets()[3] as u32
}

/// prefix length to a contiguous netmask, 0 and anything above 32 clamp.
pub const fn prefix_len_to_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else if len >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - len as u32)
    }
}

pub fn fmt_id(id: u32) -> String {
    bits_to_ipv4_addr(id).to_string()
}
