#![allow(dead_code)]

use std::net::Ipv4Addr;

use ospf_lib::area::lsdb::LsaIdentifier;
use ospf_lib::config::{InterfaceConfig, RouterConfig, BACKBONE};
use ospf_lib::lsa::opaque::{
    opaque_lsid, AbrEntry, AbrLSA, OpaqueLSA, PrefixLSA, OPAQUE_AS_LSA_TYPE, OPQ_T_MULTI_ABR,
    OPQ_T_MULTI_PREFIX,
};
use ospf_lib::lsa::router::{LinkState, RouterLSA, LS_ID_POINT_TO_POINT, LS_ID_STUB, ROUTER_LSA_TYPE};
use ospf_lib::lsa::summary::SummaryLSA;
use ospf_lib::lsa::{Header, Lsa, LsaBody, OPTION_E, OPTION_O};
use ospf_lib::neighbor::status::Status;
use ospf_lib::packet::{Output, Packet};
use ospf_lib::util::ipv4_addr_to_bits;
use ospf_lib::Router;

pub const R1: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const R2: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
pub const R3: Ipv4Addr = Ipv4Addr::new(3, 3, 3, 3);
pub const R4: Ipv4Addr = Ipv4Addr::new(4, 4, 4, 4);
pub const R5: Ipv4Addr = Ipv4Addr::new(5, 5, 5, 5);
pub const AREA1: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);

pub fn id(addr: Ipv4Addr) -> u32 {
    ipv4_addr_to_bits(addr)
}

pub fn summary(adv: Ipv4Addr, lsid: u32, seq: i32, age: u16, metric: u32) -> Lsa {
    Lsa::new(
        Header::new(age, OPTION_E, 3, lsid, id(adv), seq),
        LsaBody::SummaryNetwork(SummaryLSA {
            network_mask: 0xffffff00,
            metric,
        }),
    )
}

pub fn router_lsa(adv: Ipv4Addr, seq: i32, veb: u8, link_states: Vec<LinkState>) -> Lsa {
    Lsa::new(
        Header::new(1, OPTION_E, ROUTER_LSA_TYPE, id(adv), id(adv), seq),
        LsaBody::Router(RouterLSA { veb, link_states }),
    )
}

pub fn p2p(to: Ipv4Addr, link_data: Ipv4Addr, metric: u16) -> LinkState {
    LinkState::new(LS_ID_POINT_TO_POINT, id(to), id(link_data), metric)
}

pub fn stub(network: u32, mask: u32, metric: u16) -> LinkState {
    LinkState::new(LS_ID_STUB, network, mask, metric)
}

pub fn abr_lsa(adv: Ipv4Addr, seq: i32, entries: &[(Ipv4Addr, u8)]) -> Lsa {
    Lsa::new(
        Header::new(1, OPTION_E | OPTION_O, OPAQUE_AS_LSA_TYPE, opaque_lsid(OPQ_T_MULTI_ABR, 0), id(adv), seq),
        LsaBody::Opaque(OpaqueLSA::Abr(AbrLSA {
            entries: entries
                .iter()
                .map(|(neighbor, metric)| AbrEntry {
                    neighbor: id(*neighbor),
                    metric: *metric,
                })
                .collect(),
        })),
    )
}

pub fn prefix_lsa(adv: Ipv4Addr, opaque_id: u32, seq: i32, addr: u32, mask: u32, metric: u32) -> Lsa {
    Lsa::new(
        Header::new(
            1,
            OPTION_E | OPTION_O,
            OPAQUE_AS_LSA_TYPE,
            opaque_lsid(OPQ_T_MULTI_PREFIX, opaque_id),
            id(adv),
            seq,
        ),
        LsaBody::Opaque(OpaqueLSA::Prefix(PrefixLSA {
            subnet_mask: mask,
            subnet_addr: addr,
            metric,
        })),
    )
}

/// The same lsa at MaxAge, as its originator would flush it.
pub fn max_aged(lsa: &Lsa) -> Lsa {
    let mut header = lsa.header;
    header.age = ospf_lib::lsa::MaxAge;
    Lsa::new(header, lsa.body.clone())
}

pub fn lsa_id(lsa: &Lsa) -> LsaIdentifier {
    LsaIdentifier::from_header(&lsa.header)
}

pub fn own_summary_id(lsid: u32) -> LsaIdentifier {
    LsaIdentifier {
        lsa_type: 3,
        link_state_id: lsid,
        advertising_router: id(R1),
    }
}

/// R1 with two interfaces in the backbone: R2 is full on ifindex 1,
/// R4 is full on ifindex 2.
pub fn backbone_router() -> Router {
    backbone_router_with(RouterConfig::new(R1))
}

pub fn backbone_router_with(config: RouterConfig) -> Router {
    let config = config
        .with_interface(InterfaceConfig::new(1, "eth0", Ipv4Addr::new(10, 0, 0, 1), 24, BACKBONE, 10))
        .with_interface(InterfaceConfig::new(2, "eth1", Ipv4Addr::new(10, 0, 1, 1), 24, BACKBONE, 10));
    let mut router = Router::new(config).unwrap();
    router.interface_state(1, true).unwrap();
    router.interface_state(2, true).unwrap();
    router
        .neighbor_state(1, R2, Ipv4Addr::new(10, 0, 0, 2), Status::Full)
        .unwrap();
    router
        .neighbor_state(2, R4, Ipv4Addr::new(10, 0, 1, 4), Status::Full)
        .unwrap();
    router.take_output();
    router
}

/// R1 as an ABR: ifindex 1 in the backbone towards R2, ifindex 2 in area
/// 0.0.0.1 towards R5. `area1_stub` makes area 0.0.0.1 a stub area.
pub fn abr_router(area1_stub: bool, r5_state: Status) -> Router {
    let mut config = RouterConfig::new(R1)
        .with_interface(InterfaceConfig::new(1, "eth0", Ipv4Addr::new(10, 0, 0, 1), 24, BACKBONE, 10))
        .with_interface(InterfaceConfig::new(2, "eth1", Ipv4Addr::new(10, 1, 0, 1), 24, AREA1, 10));
    if area1_stub {
        for area in config.areas.iter_mut().filter(|area| area.id == AREA1) {
            area.stub = true;
        }
    }
    let mut router = Router::new(config).unwrap();
    router.interface_state(1, true).unwrap();
    router.interface_state(2, true).unwrap();
    router
        .neighbor_state(1, R2, Ipv4Addr::new(10, 0, 0, 2), Status::Full)
        .unwrap();
    router
        .neighbor_state(2, R5, Ipv4Addr::new(10, 1, 0, 5), r5_state)
        .unwrap();
    router.take_output();
    router
}

pub fn updates_on(output: &[Output], ifindex: u32) -> Vec<&Lsa> {
    output
        .iter()
        .filter(|out| out.ifindex == ifindex)
        .filter_map(|out| match &out.packet {
            Packet::Update(lsu) => Some(lsu.lsas.iter()),
            Packet::Ack(_) => None,
        })
        .flatten()
        .collect()
}

pub fn acks_to(output: &[Output], destination: Ipv4Addr) -> Vec<Header> {
    output
        .iter()
        .filter(|out| out.destination == destination)
        .filter_map(|out| match &out.packet {
            Packet::Ack(ack) => Some(ack.lsa_headers.iter().copied()),
            Packet::Update(_) => None,
        })
        .flatten()
        .collect()
}
